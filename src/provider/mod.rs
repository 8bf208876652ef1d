//! Collaborators supplying work records and toggling likes
//!
//! The pipeline talks to the platform through two traits:
//! - [`WorkListProvider`] yields the current snapshot of liked works
//! - [`LikeService`] revokes (or restores) a like
//!
//! HTTP implementations live in [`http`]; [`StaticWorkList`] serves a fixed
//! snapshot (tests, replays of a saved list).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::LikeAction;

pub mod http;
pub mod raw;

pub use http::{HttpLikeService, HttpWorkListProvider};
pub use raw::{RawAuthor, RawPhoto, RawWork};

/// Source of the liked-works snapshot
///
/// Records are returned newest first, the way the platform lists them. An
/// error here is fatal for the whole run.
#[async_trait]
pub trait WorkListProvider: Send + Sync {
    /// Fetch the current snapshot
    async fn fetch_works(&self) -> Result<Vec<RawWork>>;
}

/// Like/unlike mutation
#[async_trait]
pub trait LikeService: Send + Sync {
    /// Apply `action` to the like on `work_id` by `user_id`
    async fn set_like(&self, work_id: &str, user_id: &str, action: LikeAction) -> Result<()>;
}

/// Provider serving a fixed list of records
#[derive(Clone, Debug, Default)]
pub struct StaticWorkList {
    works: Vec<RawWork>,
}

impl StaticWorkList {
    /// Serve `works` on every call
    pub fn new(works: Vec<RawWork>) -> Self {
        Self { works }
    }

    /// Load a saved list (a JSON array of records)
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }
}

#[async_trait]
impl WorkListProvider for StaticWorkList {
    async fn fetch_works(&self) -> Result<Vec<RawWork>> {
        Ok(self.works.clone())
    }
}
