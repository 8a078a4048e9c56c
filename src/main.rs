//! recipe-etl - recipe ingestion and enrichment pipeline
//!
//! CLI front-end over the batch workflows, the store, the search sync path
//! and the schedule controller. Exit codes: 0 success, 1 unrecoverable
//! error, 2 validation failure, 3 external service unavailable.

use clap::{Parser, Subcommand};
use recipe_etl::config::AppConfig;
use recipe_etl::error::{Error, Result};
use recipe_etl::extractors::ModelParser;
use recipe_etl::services::{
    AnthropicClient, BusProducer, EmbeddingClient, FeedPoller, RecipeStore, SearchIndex,
};
use recipe_etl::workflow::workflows::{self, BatchOptions};
use recipe_etl::workflow::{Activities, ScheduleController, ScheduleSpec, ScheduledWorkflow};
use recipe_etl::{db, staging};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "recipe-etl", version, about = "Recipe ingestion and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a range of CSV entries and stage them as JSON
    ProcessBatch {
        csv: PathBuf,
        start: u64,
        end: u64,
        /// Use the model-assisted parser instead of pattern heuristics
        #[arg(long)]
        model: bool,
        /// Milliseconds to wait between entries
        #[arg(long)]
        pace_ms: Option<u64>,
        /// Number of concurrent chunks
        #[arg(long, default_value_t = 1)]
        fanout: usize,
        /// Load each staged file into the store right after extraction
        #[arg(long)]
        load: bool,
    },
    /// Load every staged file in a directory into the store
    LoadFolder {
        dir: PathBuf,
        #[arg(long, default_value_t = 4)]
        fanout: usize,
    },
    /// Sync all stored recipes into the search index
    SyncSearch {
        #[arg(long)]
        recreate_index: bool,
        #[arg(long, default_value_t = 1000)]
        batch_size: i64,
    },
    /// Re-load a staged recipe by identifier, then re-sync it
    ReloadRecipe { identifier: Uuid },
    /// Fetch one recipe by identifier
    GetByIdentifier { identifier: Uuid },
    /// Text search over the store
    Search {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Store statistics
    Stats,
    /// List recent recipes
    List {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Poll the feed once and publish findings to the bus
    ScrapeFeed {
        source: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    /// Consume one batch of bus events through the load path
    ConsumeBus {
        #[arg(long, default_value_t = 10)]
        max_messages: usize,
    },
    /// Manage recurring workflow schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Serve the minimal search query shim
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Create a schedule binding a workflow to an interval
    Create {
        name: String,
        /// Workflow type: scrape-feed, sync-search, consume-bus
        workflow: String,
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        batch_size: Option<i64>,
        #[arg(long)]
        max_messages: Option<usize>,
    },
    Pause { name: String },
    Unpause { name: String },
    Trigger { name: String },
    Describe { name: String },
    Delete { name: String },
    List,
    /// Run the schedule controller loop until interrupted
    Run {
        #[arg(long, default_value_t = 5)]
        tick_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Build the per-worker activity context from configuration. Clients whose
/// credentials are absent stay unconfigured; the owning command errors when
/// it actually needs them.
fn build_activities(config: &AppConfig, store: RecipeStore) -> Result<Activities> {
    let mut acts = Activities::new(store, config.stage_dir.clone())
        .with_search(SearchIndex::new(&config.search)?)
        .with_embedder(Arc::new(EmbeddingClient::new(&config.embedding)?))
        .with_feed(
            FeedPoller::new(&config.feed)?,
            BusProducer::new(&config.bus)?,
        )
        .with_bus(config.bus.clone());

    if config.model.api_key.is_some() {
        let client = AnthropicClient::new(&config.model)?;
        acts = acts.with_model_parser(ModelParser::new(Arc::new(client)));
    }
    Ok(acts)
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env();
    let pool = db::init_pool(&config.database.url).await?;
    let store = RecipeStore::new(pool.clone());
    let acts = Arc::new(build_activities(&config, store.clone())?);
    let cancel = CancellationToken::new();

    match cli.command {
        Command::ProcessBatch {
            csv,
            start,
            end,
            model,
            pace_ms,
            fanout,
            load,
        } => {
            if model && acts.model_parser.is_none() {
                return Err(Error::Config(
                    "model parsing requested but RECIPES_MODEL_API_KEY is not set".to_string(),
                ));
            }
            let mut options = if model {
                BatchOptions::model()
            } else {
                BatchOptions::local()
            };
            options.and_load = load;
            if let Some(ms) = pace_ms {
                options.pace = Duration::from_millis(ms);
            }

            let fanout = fanout.clamp(1, config.max_concurrent_activities.max(1));
            let summary = if fanout > 1 {
                workflows::process_batch_parallel(
                    Arc::clone(&acts),
                    csv,
                    start,
                    end,
                    fanout,
                    options,
                    cancel,
                )
                .await
            } else {
                workflows::process_batch_sequential(&acts, &csv, start, end, &options, &cancel)
                    .await
            };
            println!("{}", summary);
        }

        Command::LoadFolder { dir, fanout } => {
            let fanout = fanout.clamp(1, config.max_concurrent_activities.max(1));
            let paths = staging::list_staged(&dir).await?;
            info!(files = paths.len(), dir = %dir.display(), "Loading staged folder");
            let summary = workflows::load_folder(Arc::clone(&acts), paths, fanout, cancel).await;
            println!("{}", summary);
        }

        Command::SyncSearch {
            recreate_index,
            batch_size,
        } => {
            let report = workflows::sync_search(&acts, batch_size, recreate_index).await?;
            println!(
                "total={} success={} skipped={} failed={}",
                report.total, report.success, report.skipped, report.failed
            );
        }

        Command::ReloadRecipe { identifier } => {
            let path = config.stage_dir.join(format!("{}.json", identifier));
            let load = acts.load_one(&path).await?;
            println!(
                "{} -> id={} already_existed={}",
                load.title, load.recipe_id, load.already_existed
            );
            let sync = acts.sync_one(load.recipe_id).await?;
            println!("sync success={} skipped={}", sync.success, sync.skipped);
        }

        Command::GetByIdentifier { identifier } => {
            match store.get_by_identifier(&identifier).await? {
                Some(recipe) => println!("{}", serde_json::to_string_pretty(&recipe)?),
                None => {
                    return Err(Error::NotFound(format!("recipe {}", identifier)));
                }
            }
        }

        Command::Search { text, limit } => {
            let hits = store
                .search_text(&text, &Default::default(), limit, 0)
                .await?;
            if hits.is_empty() {
                println!("no recipes matched '{}'", text);
            }
            for (id, recipe) in hits {
                println!("{:>6}  {}  [{}]", id, recipe.title, recipe.identifier);
            }
        }

        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::List { limit } => {
            for (id, recipe) in store.list_page(limit, 0).await? {
                println!("{:>6}  {}", id, recipe.title);
            }
        }

        Command::ScrapeFeed { source, limit } => {
            let outcome = workflows::scrape_feed(&acts, &source, limit).await?;
            println!("items_published={}", outcome.items_published);
        }

        Command::ConsumeBus { max_messages } => {
            let outcome = acts.consume_bus_batch(max_messages).await?;
            println!(
                "processed={} duplicates={} errors={}",
                outcome.processed, outcome.duplicates, outcome.errors
            );
        }

        Command::Schedule { action } => {
            run_schedule_action(action, &pool, acts, cancel).await?;
        }

        Command::Serve { bind } => {
            let state = recipe_etl::api::ApiState {
                search: Arc::new(SearchIndex::new(&config.search)?),
                embedder: Some(Arc::new(EmbeddingClient::new(&config.embedding)?)),
            };
            let app = recipe_etl::api::router(state);
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!(bind = %bind, "Query shim listening");
            axum::serve(listener, app)
                .await
                .map_err(|e| Error::Internal(format!("server error: {}", e)))?;
        }
    }
    Ok(())
}

async fn run_schedule_action(
    action: ScheduleAction,
    pool: &sqlx::SqlitePool,
    acts: Arc<Activities>,
    cancel: CancellationToken,
) -> Result<()> {
    let controller = ScheduleController::new(pool.clone());

    match action {
        ScheduleAction::Create {
            name,
            workflow,
            interval_secs,
            source,
            limit,
            batch_size,
            max_messages,
        } => {
            let workflow = match workflow.as_str() {
                "scrape-feed" => ScheduledWorkflow::ScrapeFeed {
                    source: source.unwrap_or_else(|| "recipes".to_string()),
                    limit: limit.unwrap_or(25),
                },
                "sync-search" => ScheduledWorkflow::SyncSearch {
                    batch_size: batch_size.unwrap_or(1000),
                },
                "consume-bus" => ScheduledWorkflow::ConsumeBus {
                    max_messages: max_messages.unwrap_or(10),
                },
                other => {
                    return Err(Error::Validation(format!(
                        "unknown workflow type '{}'",
                        other
                    )))
                }
            };
            controller
                .create(&ScheduleSpec {
                    name: name.clone(),
                    workflow,
                    interval: Duration::from_secs(interval_secs),
                })
                .await?;
            println!("schedule '{}' created", name);
        }
        ScheduleAction::Pause { name } => {
            controller.pause(&name).await?;
            println!("schedule '{}' paused", name);
        }
        ScheduleAction::Unpause { name } => {
            controller.unpause(&name).await?;
            println!("schedule '{}' unpaused", name);
        }
        ScheduleAction::Trigger { name } => {
            controller.trigger_now(&name).await?;
            println!("schedule '{}' triggered", name);
        }
        ScheduleAction::Describe { name } => {
            let row = controller.describe(&name).await?;
            println!(
                "name={} workflow={} interval={}s paused={} running={} last_run={:?} next_run={:?} missed={}",
                row.name,
                row.workflow,
                row.interval_seconds,
                row.paused,
                row.running,
                row.last_run_at,
                row.next_run_at,
                row.missed_runs
            );
        }
        ScheduleAction::Delete { name } => {
            controller.delete(&name).await?;
            println!("schedule '{}' deleted", name);
        }
        ScheduleAction::List => {
            for row in controller.list().await? {
                println!(
                    "{}  {}  every {}s  paused={}",
                    row.name, row.workflow, row.interval_seconds, row.paused
                );
            }
        }
        ScheduleAction::Run { tick_secs } => {
            let loop_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping schedule controller");
                    loop_cancel.cancel();
                }
            });
            controller
                .run(acts, cancel, Duration::from_secs(tick_secs))
                .await;
        }
    }
    Ok(())
}
