//! Activities: the single-unit operations workflows are composed of
//!
//! Each activity is idempotent and independently retriable: extraction
//! writes a file named by identifier, loading dedups at the store, sync
//! overwrites the same document id. The `Activities` struct is the
//! per-worker context; expensive clients are constructed once and shared.

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::extractors::{into_recipe, LocalParser, ModelParser, SourceMeta};
use crate::services::embedding::{embedding_text, Embedder};
use crate::services::search_index::{is_malformed, recipe_to_document};
use crate::services::{BusConsumer, BusProducer, FeedEvent, FeedPoller, RecipeStore, SearchIndex};
use crate::staging;
use crate::utils::csv_source;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of staging one entry
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub staged_path: PathBuf,
    pub identifier: Uuid,
    pub already_staged: bool,
}

/// Result of loading one staged file
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub recipe_id: i64,
    pub identifier: Uuid,
    pub title: String,
    pub already_existed: bool,
}

/// Result of syncing one row into the search index
#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub success: bool,
    pub skipped: bool,
}

/// Result of one feed scrape
#[derive(Debug, Clone, Copy)]
pub struct ScrapeOutcome {
    pub items_published: usize,
}

/// Result of one bus consumption batch
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumeOutcome {
    pub processed: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Per-worker activity context
pub struct Activities {
    pub store: RecipeStore,
    pub stage_dir: PathBuf,
    local_parser: LocalParser,
    pub model_parser: Option<ModelParser>,
    pub search: Option<SearchIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub poller: Option<FeedPoller>,
    pub producer: Option<BusProducer>,
    pub bus_config: Option<BusConfig>,
}

impl Activities {
    pub fn new(store: RecipeStore, stage_dir: PathBuf) -> Self {
        Self {
            store,
            stage_dir,
            local_parser: LocalParser::new(),
            model_parser: None,
            search: None,
            embedder: None,
            poller: None,
            producer: None,
            bus_config: None,
        }
    }

    pub fn with_model_parser(mut self, parser: ModelParser) -> Self {
        self.model_parser = Some(parser);
        self
    }

    pub fn with_search(mut self, search: SearchIndex) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_feed(mut self, poller: FeedPoller, producer: BusProducer) -> Self {
        self.poller = Some(poller);
        self.producer = Some(producer);
        self
    }

    pub fn with_bus(mut self, config: BusConfig) -> Self {
        self.bus_config = Some(config);
        self
    }

    /// Parse one CSV entry and stage it as JSON. Retry-safe: the staged
    /// filename is the identifier, so a re-run that lands on the same
    /// identifier is a no-op.
    pub async fn extract_one(
        &self,
        csv_path: &Path,
        entry_number: u64,
        use_model: bool,
    ) -> Result<ExtractOutcome> {
        let entry = csv_source::read_entry(csv_path, entry_number)
            .await?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "entry {} not found in {}",
                    entry_number,
                    csv_path.display()
                ))
            })?;

        let text = entry
            .get("comment")
            .or_else(|| entry.get("text"))
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Validation(format!("entry {} has no recipe text", entry_number))
            })?;

        let mut parsed = match (&self.model_parser, use_model) {
            (Some(model), true) => model.parse(text).await?,
            _ => self.local_parser.parse(text),
        };

        // The dump's title column is authoritative when present.
        if let Some(title) = entry.get("title").filter(|t| !t.trim().is_empty()) {
            parsed.title = title.trim().to_string();
        }

        let source = SourceMeta {
            author: entry.get("user").cloned().filter(|u| !u.is_empty()),
            comments_count: entry.get("num_comments").and_then(|n| n.parse().ok()),
            ..Default::default()
        };
        let recipe = into_recipe(parsed, source);

        let (staged_path, already_staged) = staging::write_staged(&self.stage_dir, &recipe).await?;
        debug!(
            entry_number,
            identifier = %recipe.identifier,
            already_staged,
            "Staged entry"
        );
        Ok(ExtractOutcome {
            staged_path,
            identifier: recipe.identifier,
            already_staged,
        })
    }

    /// Load one staged file into the store. Dedup absorbs retries and
    /// duplicate submissions.
    pub async fn load_one(&self, staged_path: &Path) -> Result<LoadOutcome> {
        let recipe = staging::read_staged(staged_path).await?;
        let outcome = self.store.create(&recipe).await?;
        Ok(LoadOutcome {
            recipe_id: outcome.id(),
            identifier: recipe.identifier,
            title: recipe.title,
            already_existed: outcome.already_existed(),
        })
    }

    /// Project one stored row into the search index.
    pub async fn sync_one(&self, recipe_id: i64) -> Result<SyncOutcome> {
        let search = self.require_search()?;
        let recipe = self
            .store
            .get_by_id(recipe_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("recipe id {}", recipe_id)))?;

        if is_malformed(&recipe) {
            debug!(recipe_id, "Skipping malformed recipe");
            return Ok(SyncOutcome {
                success: false,
                skipped: true,
            });
        }

        let embedding = self.resolve_embedding(recipe_id, &recipe).await;
        let doc = recipe_to_document(recipe_id, &recipe, embedding.as_deref());
        let (ok, failed) = search
            .bulk_upsert(&[(recipe.identifier.to_string(), doc)])
            .await?;
        Ok(SyncOutcome {
            success: ok == 1 && failed == 0,
            skipped: false,
        })
    }

    /// Generate (or reuse) the embedding for one stored row.
    pub async fn embed_one(&self, recipe_id: i64) -> Result<bool> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            Error::Config("no embedding sidecar configured".to_string())
        })?;
        let recipe = self
            .store
            .get_by_id(recipe_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("recipe id {}", recipe_id)))?;

        let input = embedding_text(&recipe.title, &recipe.ingredients);
        if self.store.cached_embedding(recipe_id, &input).await?.is_some() {
            return Ok(true);
        }

        let vector = embedder.embed(&input).await?;
        self.store.store_embedding(recipe_id, &vector, &input).await?;
        Ok(true)
    }

    /// Poll the feed once and publish what it found to the bus.
    pub async fn scrape_feed_once(&self, source: &str, limit: u32) -> Result<ScrapeOutcome> {
        let poller = self
            .poller
            .as_ref()
            .ok_or_else(|| Error::Config("no feed poller configured".to_string()))?;
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| Error::Config("no bus producer configured".to_string()))?;

        let events = poller.poll(source, limit).await?;
        let items_published = producer.publish(&events).await?;
        info!(source, items_published, "Feed scrape complete");
        Ok(ScrapeOutcome { items_published })
    }

    /// Drain one batch of bus events through the parse + load path.
    ///
    /// Offsets commit only after the store calls return, so processing is
    /// at-least-once and the store's dedup absorbs redelivery.
    pub async fn consume_bus_batch(&self, max_messages: usize) -> Result<ConsumeOutcome> {
        let config = self
            .bus_config
            .as_ref()
            .ok_or_else(|| Error::Config("no bus configured".to_string()))?;

        // Fresh consumer per batch; no state leaks across workflow runs.
        let mut consumer = BusConsumer::new(config)?;
        let mut outcome = ConsumeOutcome::default();

        let result = async {
            while outcome.processed + outcome.errors < max_messages {
                let records = consumer.poll(2000).await?;
                if records.is_empty() {
                    break;
                }
                for record in records {
                    if outcome.processed + outcome.errors >= max_messages {
                        break;
                    }
                    match self.process_bus_record(&record.value).await {
                        Ok(true) => {
                            outcome.processed += 1;
                            outcome.duplicates += 1;
                        }
                        Ok(false) => outcome.processed += 1,
                        Err(e) => {
                            warn!(error = %e, "Bus record failed");
                            outcome.errors += 1;
                        }
                    }
                }
                consumer.commit().await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        consumer.close().await;
        result?;

        info!(
            processed = outcome.processed,
            duplicates = outcome.duplicates,
            errors = outcome.errors,
            "Bus batch consumed"
        );
        Ok(outcome)
    }

    /// Parse, stage and load one bus event. Returns whether the store had
    /// the recipe already.
    async fn process_bus_record(&self, value: &serde_json::Value) -> Result<bool> {
        let event: FeedEvent = serde_json::from_value(value.clone())?;

        let mut parsed = self.local_parser.parse(&event.text);
        if !event.title.trim().is_empty() {
            parsed.title = event.title.trim().to_string();
        }

        let source = SourceMeta {
            url: event.url.clone(),
            post_id: event.post_id.clone(),
            author: Some(event.author.clone()),
            score: event.score,
            comments_count: Some(event.num_comments),
        };
        let recipe = into_recipe(parsed, source);

        staging::write_staged(&self.stage_dir, &recipe).await?;
        let outcome = self.store.create(&recipe).await?;
        Ok(outcome.already_existed())
    }

    fn require_search(&self) -> Result<&SearchIndex> {
        self.search
            .as_ref()
            .ok_or_else(|| Error::Config("no search index configured".to_string()))
    }

    /// Embedding for a row, cache first, generation best-effort.
    pub(crate) async fn resolve_embedding(
        &self,
        recipe_id: i64,
        recipe: &crate::models::Recipe,
    ) -> Option<Vec<f32>> {
        let input = embedding_text(&recipe.title, &recipe.ingredients);

        match self.store.cached_embedding(recipe_id, &input).await {
            Ok(Some(vector)) => return Some(vector),
            Ok(None) => {}
            Err(e) => warn!(recipe_id, error = %e, "Embedding cache lookup failed"),
        }

        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&input).await {
            Ok(vector) => {
                if let Err(e) = self.store.store_embedding(recipe_id, &vector, &input).await {
                    warn!(recipe_id, error = %e, "Failed to cache embedding");
                }
                Some(vector)
            }
            Err(e) => {
                warn!(recipe_id, error = %e, "Embedding generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "date,num_comments,title,user,comment,n_char").unwrap();
        writeln!(
            f,
            r#""2024-01-01","5","Skillet Goulash","cook_a","Ingredients:\n- 1 lb ground beef\n- 2 cups elbow pasta\n- 1 can tomato sauce\n\nInstructions:\n1. Brown the beef in a skillet over medium heat.\n2. Add pasta and sauce, then simmer until tender.","120""#
        )
        .unwrap();
        writeln!(
            f,
            r#""2024-01-02","1","Nice photo","cook_b","Thanks everyone, it tasted great!","33""#
        )
        .unwrap();
        f.flush().unwrap();
        f
    }

    async fn activities(stage_dir: &Path) -> Activities {
        let pool = crate::db::init_memory_pool().await.unwrap();
        Activities::new(RecipeStore::new(pool), stage_dir.to_path_buf())
    }

    #[tokio::test]
    async fn extract_then_load_round_trip() {
        let csv = csv_fixture();
        let stage = tempfile::tempdir().unwrap();
        let acts = activities(stage.path()).await;

        let extract = acts.extract_one(csv.path(), 1, false).await.unwrap();
        assert!(!extract.already_staged);

        let load = acts.load_one(&extract.staged_path).await.unwrap();
        assert!(!load.already_existed);
        assert_eq!(load.title, "Skillet Goulash");

        // Retry of the whole chain is a no-op.
        let extract2 = acts.extract_one(csv.path(), 1, false).await.unwrap();
        assert!(extract2.already_staged);
        assert_eq!(extract2.identifier, extract.identifier);
        let load2 = acts.load_one(&extract.staged_path).await.unwrap();
        assert!(load2.already_existed);
        assert_eq!(load2.recipe_id, load.recipe_id);
    }

    #[tokio::test]
    async fn non_recipe_entry_stages_but_fails_validation_at_load() {
        let csv = csv_fixture();
        let stage = tempfile::tempdir().unwrap();
        let acts = activities(stage.path()).await;

        let extract = acts.extract_one(csv.path(), 2, false).await.unwrap();
        let err = acts.load_one(&extract.staged_path).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn missing_entry_is_a_validation_error() {
        let csv = csv_fixture();
        let stage = tempfile::tempdir().unwrap();
        let acts = activities(stage.path()).await;

        let err = acts.extract_one(csv.path(), 99, false).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn sync_without_search_is_a_config_error() {
        let stage = tempfile::tempdir().unwrap();
        let acts = activities(stage.path()).await;
        let err = acts.sync_one(1).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
