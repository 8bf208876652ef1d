//! Core types for likes-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::utils::check_path_component;

/// Kind of liked work
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkType {
    /// A single video file
    Video,
    /// An ordered set of images
    #[serde(alias = "multiple", alias = "image")]
    ImageSet,
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkType::Video => write!(f, "video"),
            WorkType::ImageSet => write!(f, "imageSet"),
        }
    }
}

/// One liked work to archive
///
/// Built by a work list provider and never modified afterwards. `media_urls`
/// and `target_filenames` are parallel: entry `i` of one belongs to entry `i`
/// of the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Platform work id (dedup key)
    pub work_id: String,
    /// Author id
    pub user_id: String,
    /// Video or image set
    pub work_type: WorkType,
    /// Remote media locations, in download order
    pub media_urls: Vec<String>,
    /// Local file names, parallel to `media_urls`
    pub target_filenames: Vec<String>,
    /// Human-facing page link, informational only
    pub page_url: String,
}

impl WorkItem {
    /// Create a work item, checking the shape invariants
    ///
    /// Fails with [`Error::Validation`] when ids are empty, a video does not
    /// have exactly one URL, the URL and filename lists differ in length, or a
    /// filename would escape its output directory.
    pub fn new(
        work_id: impl Into<String>,
        user_id: impl Into<String>,
        work_type: WorkType,
        media_urls: Vec<String>,
        target_filenames: Vec<String>,
        page_url: impl Into<String>,
    ) -> Result<Self> {
        let item = Self {
            work_id: work_id.into(),
            user_id: user_id.into(),
            work_type,
            media_urls,
            target_filenames,
            page_url: page_url.into(),
        };
        item.validate()?;
        Ok(item)
    }

    /// Re-check the invariants of an item built by hand or deserialized
    pub fn validate(&self) -> Result<()> {
        if self.work_id.trim().is_empty() {
            return Err(Error::Validation("work id is empty".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation(format!(
                "work {} has no user id",
                self.work_id
            )));
        }
        if self.media_urls.is_empty() || self.media_urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "work {} has no media url",
                self.work_id
            )));
        }
        if self.work_type == WorkType::Video && self.media_urls.len() != 1 {
            return Err(Error::Validation(format!(
                "video {} must have exactly one media url, found {}",
                self.work_id,
                self.media_urls.len()
            )));
        }
        if self.media_urls.len() != self.target_filenames.len() {
            return Err(Error::Validation(format!(
                "work {} has {} urls but {} filenames",
                self.work_id,
                self.media_urls.len(),
                self.target_filenames.len()
            )));
        }
        for name in &self.target_filenames {
            check_path_component(name)?;
        }
        Ok(())
    }

    /// Pairs of (url, filename) in download order
    pub fn media(&self) -> impl Iterator<Item = (&str, &str)> {
        self.media_urls
            .iter()
            .map(String::as_str)
            .zip(self.target_filenames.iter().map(String::as_str))
    }
}

/// Persisted proof that a work item was fully processed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// Platform work id (unique in the ledger)
    pub work_id: String,
    /// Author id
    pub user_id: String,
    /// Video or image set
    pub work_type: WorkType,
    /// Saved file names
    pub filenames: Vec<String>,
    /// Remote locations the files came from
    pub source_urls: Vec<String>,
    /// Page link
    #[serde(default)]
    pub page_url: String,
    /// Completion time
    pub saved_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Record for a work item completed at `saved_at`
    pub fn for_item(item: &WorkItem, saved_at: DateTime<Utc>) -> Self {
        Self {
            work_id: item.work_id.clone(),
            user_id: item.user_id.clone(),
            work_type: item.work_type,
            filenames: item.target_filenames.clone(),
            source_urls: item.media_urls.clone(),
            page_url: item.page_url.clone(),
            saved_at,
        }
    }
}

/// Like toggle sent to the like service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    /// Revoke an existing like
    Unlike,
    /// Restore a revoked like
    Relike,
}

impl LikeAction {
    /// Wire value of the platform's `cancel` flag
    pub fn cancel_flag(self) -> u8 {
        match self {
            LikeAction::Unlike => 1,
            LikeAction::Relike => 0,
        }
    }
}

/// Position of a work item in its pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Received from the provider, not yet examined
    Pending,
    /// Excluded before scheduling (terminal)
    Filtered,
    /// Accepted for scheduling
    Admitted,
    /// Media files are being saved
    Downloading,
    /// Like is being revoked
    Unliking,
    /// Ledger record is being written
    Recording,
    /// Completed (terminal)
    Done,
    /// Aborted (terminal)
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Pending => "pending",
            Stage::Filtered => "filtered",
            Stage::Admitted => "admitted",
            Stage::Downloading => "downloading",
            Stage::Unliking => "unliking",
            Stage::Recording => "recording",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a work item was excluded before scheduling
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Work id, user id or media URL missing, or malformed shape
    MissingFields,
    /// Author is in the user blocklist
    BlockedUser,
    /// Work is in the work blocklist
    BlockedWork,
    /// Work id already present in the ledger
    AlreadyProcessed,
    /// Same work id appeared earlier in this snapshot
    DuplicateInSnapshot,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterReason::MissingFields => "missing fields",
            FilterReason::BlockedUser => "user blocklisted",
            FilterReason::BlockedWork => "work blocklisted",
            FilterReason::AlreadyProcessed => "already processed",
            FilterReason::DuplicateInSnapshot => "duplicate in snapshot",
        };
        f.write_str(s)
    }
}

/// A work item that never reached scheduling
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredItem {
    /// Work id, when the record had one
    pub work_id: Option<String>,
    /// Exclusion reason
    pub reason: FilterReason,
}

/// Result of the best-effort unlike step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum UnlikeStatus {
    /// Auto-unlike is off
    Skipped,
    /// Like revoked
    Done,
    /// Unlike call failed; the item still completed
    Failed(String),
}

/// What a successful pipeline produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Work id
    pub work_id: String,
    /// Saved files, in media order
    pub files: Vec<PathBuf>,
    /// Total bytes written
    pub bytes: u64,
    /// Unlike step result
    pub unlike: UnlikeStatus,
    /// False when the ledger already held the id (idempotent completion)
    pub recorded: bool,
}

/// Why a scheduled work item failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Work id
    pub work_id: String,
    /// Stage where the pipeline stopped
    pub stage: Stage,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable reason
    pub message: String,
}

/// Aggregate result of one run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Records received from the provider
    pub total: usize,
    /// Items excluded before scheduling
    pub filtered: Vec<FilteredItem>,
    /// Items that reached Done
    pub succeeded: Vec<ItemReport>,
    /// Items that reached Failed
    pub failed: Vec<ItemFailure>,
    /// Completed items whose unlike call failed
    pub unlike_failures: usize,
}

impl RunReport {
    /// Number of filtered items
    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    /// Number of completed items
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failed items
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Emit the per-run summary and one line per failure
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.total,
            filtered = self.filtered_count(),
            succeeded = self.succeeded_count(),
            failed = self.failed_count(),
            unlike_failures = self.unlike_failures,
            "run finished"
        );
        for failure in &self.failed {
            tracing::error!(
                work_id = %failure.work_id,
                stage = %failure.stage,
                code = %failure.code,
                "{}",
                failure.message
            );
        }
    }
}

/// Events published while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Item excluded before scheduling
    Filtered {
        /// Work id, when known
        work_id: Option<String>,
        /// Exclusion reason
        reason: FilterReason,
    },
    /// Item accepted for scheduling
    Admitted {
        /// Work id
        work_id: String,
    },
    /// One media file saved
    MediaSaved {
        /// Work id
        work_id: String,
        /// Saved file
        path: PathBuf,
        /// Size in bytes
        bytes: u64,
    },
    /// Like revoked
    Unliked {
        /// Work id
        work_id: String,
    },
    /// Unlike call failed (non-fatal)
    UnlikeFailed {
        /// Work id
        work_id: String,
        /// Error message
        error: String,
    },
    /// Item reached Done
    Completed {
        /// Work id
        work_id: String,
        /// False when the ledger already held the id
        recorded: bool,
    },
    /// Item reached Failed
    Failed {
        /// Work id
        work_id: String,
        /// Stage where the pipeline stopped
        stage: Stage,
        /// Error message
        error: String,
    },
    /// Every scheduled item settled
    RunComplete {
        /// Filtered count
        filtered: usize,
        /// Succeeded count
        succeeded: usize,
        /// Failed count
        failed: usize,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> WorkItem {
        WorkItem::new(
            "w1",
            "u1",
            WorkType::Video,
            vec!["http://x/a.mp4".into()],
            vec!["u1_w1.mp4".into()],
            "",
        )
        .unwrap()
    }

    #[test]
    fn video_with_two_urls_is_rejected() {
        let err = WorkItem::new(
            "w1",
            "u1",
            WorkType::Video,
            vec!["http://x/a.mp4".into(), "http://x/b.mp4".into()],
            vec!["a.mp4".into(), "b.mp4".into()],
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn mismatched_filenames_are_rejected() {
        let err = WorkItem::new(
            "w2",
            "u1",
            WorkType::ImageSet,
            vec!["http://x/1.webp".into(), "http://x/2.webp".into()],
            vec!["only_one.webp".into()],
            "",
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 urls but 1 filenames"));
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(
            WorkItem::new(
                "",
                "u1",
                WorkType::Video,
                vec!["u".into()],
                vec!["f".into()],
                ""
            )
            .is_err()
        );
        assert!(
            WorkItem::new(
                "w",
                " ",
                WorkType::Video,
                vec!["u".into()],
                vec!["f".into()],
                ""
            )
            .is_err()
        );
    }

    #[test]
    fn traversal_in_filename_is_rejected() {
        let err = WorkItem::new(
            "w1",
            "u1",
            WorkType::Video,
            vec!["http://x/a.mp4".into()],
            vec!["../escape.mp4".into()],
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn media_pairs_urls_with_filenames_in_order() {
        let item = WorkItem::new(
            "w3",
            "u1",
            WorkType::ImageSet,
            vec!["http://x/1.webp".into(), "http://x/2.webp".into()],
            vec!["u1_w3_0.webp".into(), "u1_w3_1.webp".into()],
            "",
        )
        .unwrap();
        let pairs: Vec<_> = item.media().collect();
        assert_eq!(
            pairs,
            vec![
                ("http://x/1.webp", "u1_w3_0.webp"),
                ("http://x/2.webp", "u1_w3_1.webp")
            ]
        );
    }

    #[test]
    fn ledger_record_uses_camel_case_keys() {
        let record = LedgerRecord::for_item(&video(), Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["workId"], "w1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["workType"], "video");
        assert_eq!(json["filenames"][0], "u1_w1.mp4");
        assert!(json.get("savedAt").is_some());
    }

    #[test]
    fn work_type_accepts_platform_aliases() {
        let t: WorkType = serde_json::from_str("\"multiple\"").unwrap();
        assert_eq!(t, WorkType::ImageSet);
        let t: WorkType = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(t, WorkType::Video);
    }

    #[test]
    fn like_action_cancel_flags() {
        assert_eq!(LikeAction::Unlike.cancel_flag(), 1);
        assert_eq!(LikeAction::Relike.cancel_flag(), 0);
    }

    #[test]
    fn unlike_status_serializes_with_tag() {
        let json = serde_json::to_value(UnlikeStatus::Failed("HTTP 500".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "HTTP 500");
    }
}
