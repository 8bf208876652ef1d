//! Append-only, deduplicating ledger of processed works
//!
//! The ledger is a newline-delimited JSON file with one [`LedgerRecord`] per
//! line, plus an in-memory set of the work ids it holds. One [`Ledger`] owns
//! the file handle for the life of the process; all appends go through it.
//!
//! Loading is best-effort: lines that do not parse, or that carry no work id,
//! are skipped with a warning. A torn final line left behind by a crash is
//! therefore harmless, and the next append starts on a fresh line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::LedgerRecord;
use crate::utils::ensure_parent_dir;

struct Writer {
    file: tokio::fs::File,
    // Set when the file does not end with '\n' (torn line or failed write)
    needs_newline: bool,
}

/// Durable set of processed work ids
pub struct Ledger {
    path: PathBuf,
    index: RwLock<HashSet<String>>,
    writer: Mutex<Writer>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

impl Ledger {
    /// Open (creating if needed) the ledger at `path` and load its index
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::fs(&path, e))?;

        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fs(&path, e))?;
        let needs_newline = contents.last().is_some_and(|b| *b != b'\n');

        let mut index = HashSet::new();
        let mut skipped = 0usize;
        for (number, line) in contents.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match parse_work_id(line) {
                Some(id) => {
                    index.insert(id);
                }
                None => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), line = number + 1, "skipping unreadable ledger line");
                }
            }
        }

        tracing::info!(path = %path.display(), entries = index.len(), skipped, "ledger loaded");

        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Mutex::new(Writer {
                file,
                needs_newline,
            }),
        })
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `work_id` has been recorded
    pub fn has(&self, work_id: &str) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(work_id)
    }

    /// Number of recorded work ids
    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Durably append `record` unless its work id is already present
    ///
    /// Returns `Ok(true)` when a line was written, `Ok(false)` when the id
    /// was already recorded or the write failed. In the latter case the index
    /// is left untouched. A record without a work id is a caller bug and
    /// yields [`Error::InvalidRecord`].
    pub async fn append(&self, record: &LedgerRecord) -> Result<bool> {
        if record.work_id.trim().is_empty() {
            return Err(Error::InvalidRecord("record has no workId".into()));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // Holding the writer serializes appends; check again under it
        let mut writer = self.writer.lock().await;
        if self.has(&record.work_id) {
            return Ok(false);
        }

        if writer.needs_newline {
            line.insert(0, b'\n');
        }

        if let Err(e) = write_line(&mut writer.file, &line).await {
            writer.needs_newline = true;
            tracing::error!(
                path = %self.path.display(),
                work_id = %record.work_id,
                error = %e,
                "ledger write failed"
            );
            return Ok(false);
        }
        writer.needs_newline = false;

        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.work_id.clone());
        Ok(true)
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Work id of one ledger line; numbers are accepted and stringified
fn parse_work_id(line: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(line).ok()?;
    match value.get("workId")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
