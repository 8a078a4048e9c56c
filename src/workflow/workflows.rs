//! Batch workflows: sequential and fan-out/fan-in compositions
//!
//! Workflows never abort on a single item failure; they count outcomes and
//! report a summary at the end. Re-running a workflow with the same inputs
//! completes gaps: staged files and store rows already present are counted
//! as existing work, not errors.

use crate::error::Error;
use crate::services::search_index::SyncReport;
use crate::utils::retry::{retry, RetryPolicy};
use crate::workflow::activities::{Activities, ScrapeOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default pacing for model-assisted extraction, sized to stay under typical
/// provider rate limits.
pub const MODEL_PACE_MS: u64 = 1200;
/// Default pacing for pattern-based extraction.
pub const LOCAL_PACE_MS: u64 = 50;

/// Options for a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub use_model: bool,
    /// Load each staged file right after extraction
    pub and_load: bool,
    pub pace: Duration,
}

impl BatchOptions {
    pub fn local() -> Self {
        Self {
            use_model: false,
            and_load: false,
            pace: Duration::from_millis(LOCAL_PACE_MS),
        }
    }

    pub fn model() -> Self {
        Self {
            use_model: true,
            and_load: false,
            pace: Duration::from_millis(MODEL_PACE_MS),
        }
    }
}

/// Outcome counts for a batch run
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSummary {
    pub attempted: usize,
    pub inserted: usize,
    pub already_existed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn merge(&mut self, other: BatchSummary) {
        self.attempted += other.attempted;
        self.inserted += other.inserted;
        self.already_existed += other.already_existed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.elapsed = self.elapsed.max(other.elapsed);
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempted={} inserted={} already_existed={} failed={} skipped={} elapsed={:.1}s",
            self.attempted,
            self.inserted,
            self.already_existed,
            self.failed,
            self.skipped,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Process a contiguous range of CSV entries, one at a time, with a pace
/// delay between activities.
pub async fn process_batch_sequential(
    acts: &Activities,
    csv_path: &Path,
    start: u64,
    end: u64,
    options: &BatchOptions,
    cancel: &CancellationToken,
) -> BatchSummary {
    let started = Instant::now();
    let mut summary = BatchSummary::default();
    let policy = RetryPolicy::default();

    for entry_number in start..=end {
        if cancel.is_cancelled() {
            warn!(entry_number, "Batch cancelled");
            break;
        }
        summary.attempted += 1;

        let extracted = retry(&policy, "extract_one", || {
            acts.extract_one(csv_path, entry_number, options.use_model)
        })
        .await;

        match extracted {
            Ok(outcome) => {
                if options.and_load {
                    match retry(&policy, "load_one", || acts.load_one(&outcome.staged_path)).await
                    {
                        Ok(load) if load.already_existed => summary.already_existed += 1,
                        Ok(_) => summary.inserted += 1,
                        Err(Error::Validation(reason)) => {
                            info!(entry_number, %reason, "Entry skipped");
                            summary.skipped += 1;
                        }
                        Err(e) => {
                            error!(entry_number, error = %e, "Load failed");
                            summary.failed += 1;
                        }
                    }
                }
            }
            Err(Error::Validation(reason)) => {
                info!(entry_number, %reason, "Entry skipped");
                summary.skipped += 1;
            }
            Err(e) => {
                error!(entry_number, error = %e, "Extraction failed");
                summary.failed += 1;
            }
        }

        if entry_number < end && !options.pace.is_zero() {
            tokio::time::sleep(options.pace).await;
        }
    }

    summary.elapsed = started.elapsed();
    summary
}

/// Partition a range into `fanout` contiguous chunks and process them
/// concurrently. A failing chunk does not cancel the others.
pub async fn process_batch_parallel(
    acts: Arc<Activities>,
    csv_path: PathBuf,
    start: u64,
    end: u64,
    fanout: usize,
    options: BatchOptions,
    cancel: CancellationToken,
) -> BatchSummary {
    let started = Instant::now();
    let mut set = JoinSet::new();

    for (chunk_start, chunk_end) in partition_range(start, end, fanout) {
        let acts = Arc::clone(&acts);
        let csv_path = csv_path.clone();
        let options = options.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            process_batch_sequential(&acts, &csv_path, chunk_start, chunk_end, &options, &cancel)
                .await
        });
    }

    let mut summary = BatchSummary::default();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(chunk) => summary.merge(chunk),
            Err(e) => error!(error = %e, "Batch chunk panicked"),
        }
    }
    summary.elapsed = started.elapsed();
    info!(%summary, "Parallel batch complete");
    summary
}

/// Load a list of staged files, fanned out over `fanout` workers.
pub async fn load_folder(
    acts: Arc<Activities>,
    paths: Vec<PathBuf>,
    fanout: usize,
    cancel: CancellationToken,
) -> BatchSummary {
    let started = Instant::now();
    let fanout = fanout.max(1);
    let chunk_size = paths.len().div_ceil(fanout);
    let mut set = JoinSet::new();

    for chunk in paths.chunks(chunk_size.max(1)) {
        let chunk: Vec<PathBuf> = chunk.to_vec();
        let acts = Arc::clone(&acts);
        let cancel = cancel.clone();
        set.spawn(async move {
            let policy = RetryPolicy::default();
            let mut summary = BatchSummary::default();
            for path in chunk {
                if cancel.is_cancelled() {
                    break;
                }
                summary.attempted += 1;
                match retry(&policy, "load_one", || acts.load_one(&path)).await {
                    Ok(load) if load.already_existed => summary.already_existed += 1,
                    Ok(_) => summary.inserted += 1,
                    Err(Error::Validation(reason)) => {
                        info!(path = %path.display(), %reason, "Staged file skipped");
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Load failed");
                        summary.failed += 1;
                    }
                }
            }
            summary
        });
    }

    let mut summary = BatchSummary::default();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(chunk) => summary.merge(chunk),
            Err(e) => error!(error = %e, "Load chunk panicked"),
        }
    }
    summary.elapsed = started.elapsed();
    info!(%summary, "Folder load complete");
    summary
}

/// Sync the whole store into the search index.
pub async fn sync_search(
    acts: &Activities,
    batch_size: i64,
    recreate_index: bool,
) -> crate::error::Result<SyncReport> {
    let search = acts
        .search
        .as_ref()
        .ok_or_else(|| Error::Config("no search index configured".to_string()))?;

    if !search.health_check().await? {
        return Err(Error::Unavailable("search cluster is not healthy".to_string()));
    }

    if recreate_index {
        search.recreate_index().await?;
    } else {
        search.ensure_index().await?;
    }

    search
        .sync_all(&acts.store, acts.embedder.as_deref(), batch_size)
        .await
}

/// Thin wrapper over the scrape activity for scheduling.
pub async fn scrape_feed(
    acts: &Activities,
    source: &str,
    limit: u32,
) -> crate::error::Result<ScrapeOutcome> {
    let policy = RetryPolicy::default();
    retry(&policy, "scrape_feed_once", || {
        acts.scrape_feed_once(source, limit)
    })
    .await
}

/// Split an inclusive range into at most `fanout` contiguous chunks.
fn partition_range(start: u64, end: u64, fanout: usize) -> Vec<(u64, u64)> {
    if end < start {
        return Vec::new();
    }
    let total = end - start + 1;
    let fanout = (fanout.max(1) as u64).min(total);
    let chunk = total.div_ceil(fanout);

    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let chunk_end = (cursor + chunk - 1).min(end);
        chunks.push((cursor, chunk_end));
        cursor = chunk_end + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_partitions_cover_everything_once() {
        assert_eq!(partition_range(1, 5, 5), vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
        assert_eq!(partition_range(1, 10, 3), vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(partition_range(3, 3, 4), vec![(3, 3)]);
        assert_eq!(partition_range(5, 4, 2), Vec::<(u64, u64)>::new());
    }

    #[test]
    fn summary_merge_accumulates_counts() {
        let mut a = BatchSummary {
            attempted: 3,
            inserted: 2,
            skipped: 1,
            elapsed: Duration::from_secs(4),
            ..Default::default()
        };
        let b = BatchSummary {
            attempted: 2,
            failed: 1,
            already_existed: 1,
            elapsed: Duration::from_secs(6),
            ..Default::default()
        };
        a.merge(b);
        assert_eq!(a.attempted, 5);
        assert_eq!(a.inserted, 2);
        assert_eq!(a.already_existed, 1);
        assert_eq!(a.failed, 1);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.elapsed, Duration::from_secs(6));
    }
}
