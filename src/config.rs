//! Configuration types for likes-dl
//!
//! A [`Config`] is built once at process start and handed to the pipeline
//! behind an `Arc`; nothing mutates it afterwards. Values are layered with a
//! fixed precedence: explicit run options ([`RunOverrides`]) win over
//! environment variables ([`Config::apply_env`]), which win over the file or
//! built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Media download settings (directories, retry and timeout policy)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory receiving video files (default: "./downloads/video")
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,

    /// Directory receiving image-set files (default: "./downloads/images")
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Total attempts per media file, including the first (default: 3)
    #[serde(default = "default_download_retries")]
    pub retries: u32,

    /// Deadline for one attempt (default: 30s)
    #[serde(default = "default_download_timeout", with = "duration_ms")]
    pub timeout: Duration,

    /// Base of the exponential backoff between attempts (default: 500ms)
    #[serde(default = "default_backoff_base", with = "duration_ms")]
    pub backoff_base: Duration,

    /// Upper bound of the random jitter added to each backoff (default: 100ms)
    #[serde(default = "default_max_jitter", with = "duration_ms")]
    pub max_jitter: Duration,

    /// Extra request headers sent with every media request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            video_dir: default_video_dir(),
            image_dir: default_image_dir(),
            retries: default_download_retries(),
            timeout: default_download_timeout(),
            backoff_base: default_backoff_base(),
            max_jitter: default_max_jitter(),
            headers: BTreeMap::new(),
        }
    }
}

/// Orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of work items processed at once (default: 3)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Revoke the like once every media file is saved (default: false)
    #[serde(default)]
    pub auto_unlike: bool,

    /// Extra attempts for a failed unlike call (default: 0)
    #[serde(default)]
    pub unlike_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            auto_unlike: false,
            unlike_retries: 0,
        }
    }
}

/// Processed-work ledger settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the newline-delimited JSON ledger (default: "./data/ledger.jsonl")
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Static blocklists consulted before scheduling
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Authors whose works are never processed
    #[serde(default)]
    pub user_blacklist: HashSet<String>,

    /// Works that are never processed
    #[serde(default)]
    pub work_blacklist: HashSet<String>,
}

/// One remote endpoint used by the HTTP-backed collaborators
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint URL
    pub url: String,

    /// HTTP method (default: GET)
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers (cookies, referer, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Optional JSON body template
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Remote API settings for listing works and toggling likes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Deadline for one metadata / mutation exchange (default: 10s)
    #[serde(default = "default_fetch_timeout", with = "duration_ms")]
    pub fetch_timeout: Duration,

    /// Liked-works list endpoint
    #[serde(default)]
    pub list: Option<EndpointConfig>,

    /// JSON pointer of the work array inside the list response (default: "/data/list")
    #[serde(default = "default_list_pointer")]
    pub list_pointer: String,

    /// Like/unlike mutation endpoint
    #[serde(default)]
    pub like: Option<EndpointConfig>,

    /// Base URL for video page links when the record carries none
    #[serde(default = "default_video_page_base")]
    pub video_page_base: String,

    /// Base URL for image-set page links when the record carries none
    #[serde(default = "default_image_page_base")]
    pub image_page_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            list: None,
            list_pointer: default_list_pointer(),
            like: None,
            video_page_base: default_video_page_base(),
            image_page_base: default_image_page_base(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig): output directories, retry policy
/// - [`pipeline`](PipelineConfig): concurrency, auto-unlike
/// - [`ledger`](LedgerConfig): processed-work ledger location
/// - [`filter`](FilterConfig): blocklists
/// - [`api`](ApiConfig): remote endpoints
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Media download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Orchestration settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Ledger settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Blocklists
    #[serde(default)]
    pub filter: FilterConfig,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Options given explicitly for one run; they override everything else
#[derive(Clone, Debug, Default)]
pub struct RunOverrides {
    /// Override for [`PipelineConfig::concurrency_limit`]
    pub concurrency_limit: Option<usize>,
    /// Override for [`PipelineConfig::auto_unlike`]
    pub auto_unlike: Option<bool>,
    /// Override for [`DownloadConfig::retries`]
    pub download_retries: Option<u32>,
    /// Override for [`LedgerConfig::path`]
    pub ledger_path: Option<PathBuf>,
}

/// Environment variable prefix for all recognized keys
pub const ENV_PREFIX: &str = "LIKES_DL_";

impl Config {
    /// Parse a JSON config document and validate it
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid config document: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay recognized environment variables
    ///
    /// `lookup` receives the full variable name (e.g. `LIKES_DL_CONCURRENCY`)
    /// and returns its value if set. Pass `|k| std::env::var(k).ok()` for the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        };

        if let Some((key, v)) = get("CONCURRENCY") {
            self.pipeline.concurrency_limit = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = get("AUTO_UNLIKE") {
            self.pipeline.auto_unlike = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = get("UNLIKE_RETRIES") {
            self.pipeline.unlike_retries = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = get("DOWNLOAD_RETRIES") {
            self.download.retries = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = get("DOWNLOAD_TIMEOUT_MS") {
            self.download.timeout = Duration::from_millis(parse_env(&key, &v)?);
        }
        if let Some((key, v)) = get("BACKOFF_BASE_MS") {
            self.download.backoff_base = Duration::from_millis(parse_env(&key, &v)?);
        }
        if let Some((_, v)) = get("VIDEO_DIR") {
            self.download.video_dir = PathBuf::from(v);
        }
        if let Some((_, v)) = get("IMAGE_DIR") {
            self.download.image_dir = PathBuf::from(v);
        }
        if let Some((_, v)) = get("LEDGER_PATH") {
            self.ledger.path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Apply explicit run options (highest precedence)
    pub fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(limit) = overrides.concurrency_limit {
            self.pipeline.concurrency_limit = limit;
        }
        if let Some(auto_unlike) = overrides.auto_unlike {
            self.pipeline.auto_unlike = auto_unlike;
        }
        if let Some(retries) = overrides.download_retries {
            self.download.retries = retries;
        }
        if let Some(path) = &overrides.ledger_path {
            self.ledger.path = path.clone();
        }
    }

    /// Check invariants the core relies on
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency_limit < 1 {
            return Err(Error::config(
                "pipeline.concurrency_limit",
                "concurrency limit must be >= 1",
            ));
        }
        if self.download.retries < 1 {
            return Err(Error::config(
                "download.retries",
                "at least one download attempt is required",
            ));
        }
        if self.download.timeout.is_zero() {
            return Err(Error::config("download.timeout", "timeout must be > 0"));
        }
        if self.api.fetch_timeout.is_zero() {
            return Err(Error::config("api.fetch_timeout", "timeout must be > 0"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(key, format!("cannot parse {value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(Error::config(key, format!("expected a boolean, got {value:?}"))),
    }
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("./downloads/video")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./downloads/images")
}

fn default_download_retries() -> u32 {
    3
}

fn default_download_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_backoff_base() -> Duration {
    Duration::from_millis(500)
}

fn default_max_jitter() -> Duration {
    Duration::from_millis(100)
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./data/ledger.jsonl")
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_millis(10_000)
}

fn default_list_pointer() -> String {
    "/data/list".to_string()
}

fn default_video_page_base() -> String {
    "https://www.kuaishou.com/short-video/".to_string()
}

fn default_image_page_base() -> String {
    "https://live.kuaishou.com/u/".to_string()
}

// Duration serialization helper (integer milliseconds)
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
