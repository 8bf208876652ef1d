//! Per-work pipeline orchestration
//!
//! A run takes one snapshot from a [`WorkListProvider`], reverses it so the
//! oldest like goes first, screens every record ([`filter`]) and hands the
//! admitted items to a [`BoundedRunner`]. Each admitted item then walks
//! `Downloading -> (Unliking) -> Recording -> Done`, or stops in `Failed`
//! ([`item`]).
//!
//! Submodules:
//! - [`filter`] - normalization, blocklists, ledger and snapshot dedup
//! - [`item`] - the per-item state machine

pub mod filter;
mod item;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::download::{DownloadOptions, Downloader};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::pool::{BoundedRunner, Outcome, Rejection};
use crate::provider::{LikeService, RawWork, WorkListProvider};
use crate::types::{Event, FilteredItem, ItemFailure, ItemReport, RunReport, Stage, UnlikeStatus, WorkItem};

/// Capacity of the event channel; slow subscribers miss older events
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Error that stopped one item, tagged with the stage it happened in
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    /// Stage the item was in
    pub stage: Stage,
    /// Underlying error
    pub source: Error,
}

impl StageError {
    fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

/// Orchestrates filtering, scheduling and per-item processing
pub struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) downloader: Downloader,
    pub(crate) download_options: DownloadOptions,
    pub(crate) like_service: Option<Arc<dyn LikeService>>,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("like_service", &self.like_service.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Assemble a pipeline from already constructed parts
    ///
    /// The configuration is validated here, so a bad concurrency limit is
    /// reported before any run starts.
    pub fn new(config: Arc<Config>, downloader: Downloader, ledger: Arc<Ledger>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let download_options = DownloadOptions::from(&config.download);
        Ok(Self {
            config,
            downloader,
            download_options,
            like_service: None,
            ledger,
            event_tx,
        })
    }

    /// Validate `config`, open its ledger and build a downloader
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let ledger = Ledger::open(&config.ledger.path).await?;
        Self::new(Arc::new(config), Downloader::new()?, Arc::new(ledger))
    }

    /// Use `service` for the unlike step
    pub fn with_like_service(mut self, service: Arc<dyn LikeService>) -> Self {
        self.like_service = Some(service);
        self
    }

    /// Subscribe to progress events
    ///
    /// Events sent while nobody listens are dropped; they never block a run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ledger consulted and extended by this pipeline
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Fetch a snapshot from `provider` and process it
    ///
    /// A provider failure aborts the run before any item starts and is
    /// returned as the error. Per-item failures only show up in the report.
    pub async fn run(&self, provider: &dyn WorkListProvider) -> Result<RunReport> {
        self.check_ready()?;

        let works = provider.fetch_works().await.map_err(|e| {
            tracing::error!(error = %e, code = e.error_code(), "failed to fetch the liked-works list");
            e
        })?;

        self.run_snapshot(works).await
    }

    /// Process an already fetched snapshot (newest first, as listed)
    pub async fn run_snapshot(&self, mut works: Vec<RawWork>) -> Result<RunReport> {
        self.check_ready()?;
        let runner = BoundedRunner::new(self.config.pipeline.concurrency_limit)?;

        let total = works.len();
        works.reverse();

        let (admitted, filtered) = self.filter(works);
        tracing::info!(
            total,
            admitted = admitted.len(),
            filtered = filtered.len(),
            concurrency = runner.limit(),
            "starting run"
        );

        let outcomes = runner.run(&admitted, |item| self.process_item(item)).await;

        let mut report = RunReport {
            total,
            filtered,
            ..Default::default()
        };
        for (item, outcome) in admitted.iter().zip(outcomes) {
            match outcome {
                Outcome::Fulfilled(done) => {
                    if matches!(done.unlike, UnlikeStatus::Failed(_)) {
                        report.unlike_failures += 1;
                    }
                    report.succeeded.push(done);
                }
                Outcome::Rejected(rejection) => {
                    report.failed.push(failure_for(item, rejection));
                }
            }
        }

        self.emit(Event::RunComplete {
            filtered: report.filtered_count(),
            succeeded: report.succeeded_count(),
            failed: report.failed_count(),
        });
        Ok(report)
    }

    /// Split a snapshot into schedulable items and filtered records
    ///
    /// Order is preserved. Emits one [`Event::Filtered`] per excluded record.
    pub fn filter(&self, works: Vec<RawWork>) -> (Vec<WorkItem>, Vec<FilteredItem>) {
        let screened = filter::screen(works, &self.config.api, &self.config.filter, &self.ledger);
        for skipped in &screened.filtered {
            self.emit(Event::Filtered {
                work_id: skipped.work_id.clone(),
                reason: skipped.reason.clone(),
            });
        }
        (screened.admitted, screened.filtered)
    }

    fn check_ready(&self) -> Result<()> {
        if self.config.pipeline.auto_unlike && self.like_service.is_none() {
            return Err(Error::config(
                "pipeline.auto_unlike",
                "auto-unlike is enabled but no like service was provided",
            ));
        }
        Ok(())
    }
}

fn failure_for(item: &WorkItem, rejection: Rejection<StageError>) -> ItemFailure {
    match rejection {
        Rejection::Failed(e) => ItemFailure {
            work_id: item.work_id.clone(),
            stage: e.stage,
            code: e.source.error_code().to_string(),
            message: e.source.to_string(),
        },
        Rejection::Panicked(message) => ItemFailure {
            work_id: item.work_id.clone(),
            stage: Stage::Failed,
            code: "panic".to_string(),
            message,
        },
    }
}

/// Convenience alias for a pipeline result of one item
pub type ItemResult = std::result::Result<ItemReport, StageError>;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
