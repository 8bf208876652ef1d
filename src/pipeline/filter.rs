//! Pre-admission screening of a snapshot
//!
//! A record is filtered, in this order of precedence, when it:
//! 1. cannot be normalized into a [`WorkItem`] (missing ids or media)
//! 2. names a blocklisted work
//! 3. names a blocklisted author
//! 4. is already in the ledger
//! 5. repeats a work id seen earlier in the same snapshot

use std::collections::HashSet;

use crate::config::{ApiConfig, FilterConfig};
use crate::ledger::Ledger;
use crate::provider::RawWork;
use crate::types::{FilterReason, FilteredItem, WorkItem};

/// Result of screening one snapshot
#[derive(Debug, Default)]
pub struct Screened {
    /// Items cleared for scheduling, in snapshot order
    pub admitted: Vec<WorkItem>,
    /// Records excluded, in snapshot order
    pub filtered: Vec<FilteredItem>,
}

/// Screen `works` in order
pub fn screen(
    works: Vec<RawWork>,
    api: &ApiConfig,
    blocklists: &FilterConfig,
    ledger: &Ledger,
) -> Screened {
    let mut screened = Screened::default();
    let mut seen = HashSet::new();

    for raw in works {
        let item = match raw.normalize(api) {
            Ok(item) => item,
            Err(e) => {
                let work_id = raw.work_id().map(str::to_string);
                tracing::warn!(work_id = ?work_id, error = %e, "skipping malformed work record");
                screened.filtered.push(FilteredItem {
                    work_id,
                    reason: FilterReason::MissingFields,
                });
                continue;
            }
        };

        let reason = if blocklists.work_blacklist.contains(&item.work_id) {
            Some(FilterReason::BlockedWork)
        } else if blocklists.user_blacklist.contains(&item.user_id) {
            Some(FilterReason::BlockedUser)
        } else if ledger.has(&item.work_id) {
            Some(FilterReason::AlreadyProcessed)
        } else if !seen.insert(item.work_id.clone()) {
            Some(FilterReason::DuplicateInSnapshot)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                tracing::info!(work_id = %item.work_id, user_id = %item.user_id, %reason, "filtered");
                screened.filtered.push(FilteredItem {
                    work_id: Some(item.work_id),
                    reason,
                });
            }
            None => screened.admitted.push(item),
        }
    }

    screened
}
