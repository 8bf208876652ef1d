//! # likes-dl
//!
//! Archive liked works (videos and image sets) to local disk, optionally
//! revoke each like afterwards, and remember what was processed so that a
//! later run never does the same work twice.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - no CLI, the caller supplies config and collaborators
//! - **Explicit configuration** - one [`Config`] built at startup, shared read-only
//! - **Isolated failures** - one work failing never affects another
//! - **Event-driven** - consumers may subscribe to progress events
//!
//! ## Quick Start
//!
//! ```no_run
//! use likes_dl::{Config, Fetcher, HttpWorkListProvider, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.apply_env(|key| std::env::var(key).ok())?;
//!     config.validate()?;
//!
//!     let fetcher = Fetcher::new(config.api.fetch_timeout)?;
//!     let provider = HttpWorkListProvider::from_config(fetcher, &config.api)?;
//!     let pipeline = Pipeline::from_config(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = pipeline.run(&provider).await?;
//!     report.log_summary();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Resilient media downloader
pub mod download;
/// Error types
pub mod error;
/// Single-shot JSON exchange
pub mod fetch;
/// Deduplicating ledger of processed works
pub mod ledger;
/// Per-work pipeline orchestration
pub mod pipeline;
/// Bounded concurrency runner
pub mod pool;
/// Work list and like service collaborators
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, RunOverrides};
pub use download::{DownloadOptions, Downloader};
pub use error::{Error, Result, ResultCode};
pub use fetch::{FetchRequest, Fetcher};
pub use ledger::Ledger;
pub use pipeline::{Pipeline, StageError};
pub use pool::{BoundedRunner, Outcome, Rejection};
pub use provider::{
    HttpLikeService, HttpWorkListProvider, LikeService, RawWork, StaticWorkList, WorkListProvider,
};
pub use types::{
    Event, FilterReason, FilteredItem, ItemFailure, ItemReport, LedgerRecord, LikeAction,
    RunReport, Stage, UnlikeStatus, WorkItem, WorkType,
};
