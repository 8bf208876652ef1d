//! Pipeline construction against a temporary directory

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use likes_dl::{Config, Pipeline};

/// A pipeline whose output dirs and ledger live in a temp dir
pub struct TestEnv {
    /// Keeps the directory alive for the test's duration
    pub dir: TempDir,
    /// Configuration the pipeline was built from
    pub config: Config,
}

impl TestEnv {
    /// Fresh environment with fast retries
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.download.video_dir = dir.path().join("downloads/video");
        config.download.image_dir = dir.path().join("downloads/images");
        config.download.retries = 3;
        config.download.timeout = Duration::from_secs(5);
        config.download.backoff_base = Duration::from_millis(10);
        config.download.max_jitter = Duration::from_millis(5);
        config.ledger.path = dir.path().join("data/ledger.jsonl");
        Self { dir, config }
    }

    /// Build a pipeline from the current config
    pub async fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(self.config.clone())
            .await
            .expect("pipeline should build")
    }

    /// Path of a saved video
    pub fn video(&self, name: &str) -> PathBuf {
        self.config.download.video_dir.join(name)
    }

    /// Path of a saved image
    pub fn image(&self, name: &str) -> PathBuf {
        self.config.download.image_dir.join(name)
    }

    /// Ledger file contents, one entry per non-empty line
    pub fn ledger_lines(&self) -> Vec<serde_json::Value> {
        read_ledger(&self.config.ledger.path)
    }
}

/// Parse every non-empty line of a ledger file
pub fn read_ledger(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("ledger line should be JSON"))
        .collect()
}

/// True when `path` exists and has content
pub fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
