//! State machine for one admitted work item

use chrono::Utc;
use std::path::PathBuf;

use super::{ItemResult, Pipeline, StageError};
use crate::error::Error;
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{Event, ItemReport, LedgerRecord, LikeAction, Stage, UnlikeStatus, WorkItem, WorkType};

impl Pipeline {
    /// Run one admitted item through download, optional unlike and recording
    ///
    /// Media files are fetched in order and the first failure stops the
    /// item; files already saved stay on disk. An unlike failure is reported
    /// in the result but does not fail the item. Finding the id already
    /// recorded is a normal completion with `recorded == false`.
    pub async fn process_item(&self, item: &WorkItem) -> ItemResult {
        let work_id = item.work_id.as_str();
        self.emit(Event::Admitted {
            work_id: work_id.to_string(),
        });
        tracing::info!(work_id, user_id = %item.user_id, work_type = %item.work_type, files = item.media_urls.len(), "processing");

        let result = self.drive(item).await;
        match &result {
            Ok(report) => {
                tracing::info!(work_id, bytes = report.bytes, recorded = report.recorded, "done");
                self.emit(Event::Completed {
                    work_id: work_id.to_string(),
                    recorded: report.recorded,
                });
            }
            Err(e) => {
                tracing::error!(work_id, stage = %e.stage, code = e.source.error_code(), error = %e.source, "work failed");
                self.emit(Event::Failed {
                    work_id: work_id.to_string(),
                    stage: e.stage,
                    error: e.source.to_string(),
                });
            }
        }
        result
    }

    async fn drive(&self, item: &WorkItem) -> ItemResult {
        item.validate()
            .map_err(|e| StageError::new(Stage::Admitted, e))?;

        let (files, bytes) = self
            .download_all(item)
            .await
            .map_err(|e| StageError::new(Stage::Downloading, e))?;

        let unlike = if self.config.pipeline.auto_unlike {
            self.unlike(item).await
        } else {
            UnlikeStatus::Skipped
        };

        let recorded = self
            .record(item)
            .await
            .map_err(|e| StageError::new(Stage::Recording, e))?;

        Ok(ItemReport {
            work_id: item.work_id.clone(),
            files,
            bytes,
            unlike,
            recorded,
        })
    }

    fn destination(&self, item: &WorkItem, filename: &str) -> PathBuf {
        let dir = match item.work_type {
            WorkType::Video => &self.config.download.video_dir,
            WorkType::ImageSet => &self.config.download.image_dir,
        };
        dir.join(filename)
    }

    async fn download_all(&self, item: &WorkItem) -> crate::error::Result<(Vec<PathBuf>, u64)> {
        let mut files = Vec::with_capacity(item.media_urls.len());
        let mut total = 0u64;

        for (index, (url, filename)) in item.media().enumerate() {
            let dest = self.destination(item, filename);
            let bytes = self
                .downloader
                .download(url, &dest, &self.download_options)
                .await
                .map_err(|e| {
                    tracing::warn!(work_id = %item.work_id, index, url, error = %e, "media download failed");
                    e
                })?;

            tracing::debug!(work_id = %item.work_id, path = %dest.display(), bytes, "media saved");
            self.emit(Event::MediaSaved {
                work_id: item.work_id.clone(),
                path: dest.clone(),
                bytes,
            });
            total += bytes;
            files.push(dest);
        }

        Ok((files, total))
    }

    async fn unlike(&self, item: &WorkItem) -> UnlikeStatus {
        let Some(service) = self.like_service.as_deref() else {
            return UnlikeStatus::Failed("no like service configured".into());
        };

        let policy = RetryPolicy::new(
            self.config.pipeline.unlike_retries.saturating_add(1),
            self.config.download.backoff_base,
        )
        .with_jitter(self.config.download.max_jitter);

        let result = with_retry(&policy, move || {
            service.set_like(&item.work_id, &item.user_id, LikeAction::Unlike)
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(work_id = %item.work_id, "unliked");
                self.emit(Event::Unliked {
                    work_id: item.work_id.clone(),
                });
                UnlikeStatus::Done
            }
            Err(e) => {
                tracing::warn!(work_id = %item.work_id, code = e.error_code(), error = %e, "unlike failed; keeping downloads");
                self.emit(Event::UnlikeFailed {
                    work_id: item.work_id.clone(),
                    error: e.to_string(),
                });
                UnlikeStatus::Failed(e.to_string())
            }
        }
    }

    async fn record(&self, item: &WorkItem) -> Result<bool, Error> {
        let record = LedgerRecord::for_item(item, Utc::now());
        let written = self.ledger.append(&record).await?;
        if !written {
            if self.ledger.has(&item.work_id) {
                tracing::debug!(work_id = %item.work_id, "already recorded");
            } else {
                tracing::warn!(work_id = %item.work_id, "ledger write failed; work will be picked up again next run");
            }
        }
        Ok(written)
    }
}
