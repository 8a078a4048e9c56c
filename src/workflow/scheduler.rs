//! Schedule controller for recurring workflow executions
//!
//! Schedules persist in the store so they survive worker restarts. The run
//! loop claims due schedules through the database (one worker wins), runs
//! the bound workflow, and advances the next-run time. Overlap policy: a
//! schedule whose previous run is still going is skipped, not queued.
//! Unpausing collapses every slot missed while paused into at most one
//! catch-up execution.

use crate::db::schedules::{self, ScheduleRow};
use crate::error::{Error, Result};
use crate::workflow::activities::Activities;
use crate::workflow::workflows;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Workflow types a schedule can bind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum ScheduledWorkflow {
    ScrapeFeed { source: String, limit: u32 },
    SyncSearch { batch_size: i64 },
    ConsumeBus { max_messages: usize },
}

impl ScheduledWorkflow {
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduledWorkflow::ScrapeFeed { .. } => "scrape_feed",
            ScheduledWorkflow::SyncSearch { .. } => "sync_search",
            ScheduledWorkflow::ConsumeBus { .. } => "consume_bus",
        }
    }
}

/// A new schedule: name, bound workflow, and interval
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub name: String,
    pub workflow: ScheduledWorkflow,
    pub interval: Duration,
}

/// Controller over persisted schedules
#[derive(Clone)]
pub struct ScheduleController {
    db: SqlitePool,
}

impl ScheduleController {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, spec: &ScheduleSpec) -> Result<()> {
        if spec.interval.is_zero() {
            return Err(Error::Validation("schedule interval must be positive".to_string()));
        }
        let input = serde_json::to_string(&spec.workflow)?;
        let next_run = Utc::now() + ChronoDuration::from_std(spec.interval).unwrap_or_default();
        schedules::insert(
            &self.db,
            &Uuid::new_v4().to_string(),
            &spec.name,
            spec.workflow.kind(),
            &input,
            spec.interval.as_secs() as i64,
            next_run,
        )
        .await?;
        info!(name = %spec.name, workflow = spec.workflow.kind(), "Schedule created");
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> Result<()> {
        if !schedules::set_paused(&self.db, name, true).await? {
            return Err(Error::NotFound(format!("schedule '{}'", name)));
        }
        info!(name, "Schedule paused");
        Ok(())
    }

    /// Unpause a schedule. Slots missed while paused collapse into a single
    /// immediate catch-up execution.
    pub async fn unpause(&self, name: &str) -> Result<()> {
        let row = self.describe(name).await?;
        if !schedules::set_paused(&self.db, name, false).await? {
            return Err(Error::NotFound(format!("schedule '{}'", name)));
        }

        let now = Utc::now();
        if let Some(next) = row.next_run_at {
            let next = DateTime::<Utc>::from_naive_utc_and_offset(next, Utc);
            if next < now {
                let missed = (now - next).num_seconds() / row.interval_seconds.max(1);
                schedules::set_next_run(&self.db, name, now, missed.max(1)).await?;
                info!(name, missed, "Schedule unpaused with one catch-up slot");
                return Ok(());
            }
        }
        info!(name, "Schedule unpaused");
        Ok(())
    }

    pub async fn trigger_now(&self, name: &str) -> Result<()> {
        // Ensure the schedule exists before rescheduling it.
        self.describe(name).await?;
        schedules::set_next_run(&self.db, name, Utc::now(), 0).await?;
        info!(name, "Schedule triggered");
        Ok(())
    }

    pub async fn describe(&self, name: &str) -> Result<ScheduleRow> {
        schedules::get_by_name(&self.db, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule '{}'", name)))
    }

    pub async fn list(&self) -> Result<Vec<ScheduleRow>> {
        schedules::list(&self.db).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        if !schedules::delete(&self.db, name).await? {
            return Err(Error::NotFound(format!("schedule '{}'", name)));
        }
        info!(name, "Schedule deleted");
        Ok(())
    }

    /// Drive due schedules until cancelled.
    pub async fn run(&self, acts: Arc<Activities>, cancel: CancellationToken, tick: Duration) {
        info!(tick_secs = tick.as_secs(), "Schedule controller running");
        loop {
            if cancel.is_cancelled() {
                info!("Schedule controller stopped");
                return;
            }

            match self.tick(&acts).await {
                Ok(ran) if ran > 0 => info!(ran, "Schedule tick complete"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Schedule tick failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    /// Run everything currently due. Returns how many schedules executed.
    pub async fn tick(&self, acts: &Activities) -> Result<usize> {
        let due = schedules::due(&self.db, Utc::now()).await?;
        let mut ran = 0;

        for row in due {
            if !schedules::try_claim(&self.db, &row.name).await? {
                // Previous run still going; overlap policy says skip.
                continue;
            }

            let started = Utc::now();
            if let Err(e) = self.execute(acts, &row).await {
                warn!(name = %row.name, error = %e, "Scheduled run failed");
            }
            let next = started + ChronoDuration::seconds(row.interval_seconds);
            schedules::mark_run_complete(&self.db, &row.name, started, next).await?;
            ran += 1;
        }
        Ok(ran)
    }

    async fn execute(&self, acts: &Activities, row: &ScheduleRow) -> Result<()> {
        let workflow: ScheduledWorkflow = serde_json::from_str(&row.input)?;
        info!(name = %row.name, workflow = workflow.kind(), "Running scheduled workflow");

        match workflow {
            ScheduledWorkflow::ScrapeFeed { source, limit } => {
                let outcome = workflows::scrape_feed(acts, &source, limit).await?;
                info!(
                    name = %row.name,
                    items_published = outcome.items_published,
                    "Scheduled scrape complete"
                );
            }
            ScheduledWorkflow::SyncSearch { batch_size } => {
                let report = workflows::sync_search(acts, batch_size, false).await?;
                info!(
                    name = %row.name,
                    success = report.success,
                    failed = report.failed,
                    "Scheduled sync complete"
                );
            }
            ScheduledWorkflow::ConsumeBus { max_messages } => {
                let outcome = acts.consume_bus_batch(max_messages).await?;
                info!(
                    name = %row.name,
                    processed = outcome.processed,
                    "Scheduled bus consumption complete"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn controller() -> ScheduleController {
        ScheduleController::new(crate::db::init_memory_pool().await.unwrap())
    }

    fn spec(name: &str) -> ScheduleSpec {
        ScheduleSpec {
            name: name.to_string(),
            workflow: ScheduledWorkflow::ScrapeFeed {
                source: "recipes".to_string(),
                limit: 25,
            },
            interval: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn create_describe_delete() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();

        let row = ctl.describe("scrape").await.unwrap();
        assert_eq!(row.workflow, "scrape_feed");
        assert_eq!(row.interval_seconds, 300);
        assert!(!row.paused);

        let parsed: ScheduledWorkflow = serde_json::from_str(&row.input).unwrap();
        assert_eq!(
            parsed,
            ScheduledWorkflow::ScrapeFeed {
                source: "recipes".to_string(),
                limit: 25
            }
        );

        ctl.delete("scrape").await.unwrap();
        assert!(matches!(ctl.describe("scrape").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn pause_blocks_due_selection() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();
        ctl.trigger_now("scrape").await.unwrap();
        ctl.pause("scrape").await.unwrap();

        let due = schedules::due(&ctl.db, Utc::now() + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn unpause_collapses_missed_slots_into_one() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();
        ctl.pause("scrape").await.unwrap();

        // Simulate two missed intervals while paused.
        let two_back = Utc::now() - ChronoDuration::seconds(600);
        schedules::set_next_run(&ctl.db, "scrape", two_back, 0).await.unwrap();

        ctl.unpause("scrape").await.unwrap();
        let row = ctl.describe("scrape").await.unwrap();
        assert!(row.missed_runs >= 1);

        // Exactly one due execution, not two.
        let due = schedules::due(&ctl.db, Utc::now() + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        // After claiming and completing, the next slot is a full interval out.
        assert!(schedules::try_claim(&ctl.db, "scrape").await.unwrap());
        let now = Utc::now();
        schedules::mark_run_complete(&ctl.db, "scrape", now, now + ChronoDuration::seconds(300))
            .await
            .unwrap();
        let due = schedules::due(&ctl.db, Utc::now() + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn claimed_schedule_is_not_claimed_twice() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();

        assert!(schedules::try_claim(&ctl.db, "scrape").await.unwrap());
        assert!(!schedules::try_claim(&ctl.db, "scrape").await.unwrap());
    }

    #[tokio::test]
    async fn trigger_now_makes_schedule_due() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();

        let due = schedules::due(&ctl.db, Utc::now()).await.unwrap();
        assert!(due.is_empty());

        ctl.trigger_now("scrape").await.unwrap();
        let due = schedules::due(&ctl.db, Utc::now() + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let ctl = controller().await;
        ctl.create(&spec("scrape")).await.unwrap();
        assert!(ctl.create(&spec("scrape")).await.is_err());
    }
}
