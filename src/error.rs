//! Error types for likes-dl
//!
//! One error enum covers the whole crate. Variants are grouped by where they
//! originate:
//! - network exchange failures (timeout, HTTP status, decode, application sentinel)
//! - local persistence failures (filesystem, invalid ledger record)
//! - contract violations (validation, configuration)
//!
//! Errors raised while processing a single work item never leave that item's
//! pipeline; they end up as a rejected outcome in the run report.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for likes-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for likes-dl
#[derive(Debug, Error)]
pub enum Error {
    /// No complete response arrived before the deadline
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The URL that was being requested
        url: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Server answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Response body was not valid JSON
    #[error("failed to decode response from {url}: {reason}")]
    Decode {
        /// The URL that was requested
        url: String,
        /// Decoder message
        reason: String,
    },

    /// HTTP exchange succeeded but the payload carries a failure result code
    #[error("application error (result code {code}){}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Application {
        /// The result code reported by the remote side
        code: ResultCode,
        /// Optional message reported alongside the code
        message: Option<String>,
    },

    /// Ledger record is missing its work id
    #[error("invalid ledger record: {0}")]
    InvalidRecord(String),

    /// Filesystem operation failed
    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Download finished but produced an empty file
    #[error("downloaded file {} is empty", .path.display())]
    EmptyFile {
        /// Destination that ended up with zero bytes
        path: PathBuf,
    },

    /// Malformed input (work item fields, ids, runner arguments)
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency_limit")
        key: Option<String>,
    },

    /// Transport-level network failure (connect, reset, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure code found in a response's `result` field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultCode {
    /// Integer code, the platform's usual form
    Numeric(i64),
    /// Any other JSON value, kept as its JSON text (e.g. `"error"`, `"1"`)
    Other(String),
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultCode::Numeric(code) => write!(f, "{code}"),
            ResultCode::Other(raw) => f.write_str(raw),
        }
    }
}

impl Error {
    /// Build a filesystem error for `path`
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Build a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code, stable across releases
    ///
    /// Used in the run report and as a structured log field.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "timeout",
            Error::Http { .. } => "http_error",
            Error::Decode { .. } => "decode_error",
            Error::Application { .. } => "application_error",
            Error::InvalidRecord(_) => "invalid_record",
            Error::Filesystem { .. } => "filesystem_error",
            Error::EmptyFile { .. } => "empty_file",
            Error::Validation(_) => "validation_error",
            Error::Config { .. } => "config_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
