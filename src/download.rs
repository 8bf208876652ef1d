//! Resilient media downloader
//!
//! [`Downloader::download`] streams one remote resource into a local file.
//! Opening the stream is bounded by a deadline; the body may take as long as
//! it needs while chunks keep arriving. A failed attempt of any kind
//! removes whatever it wrote and, unless it was the last, sleeps for the
//! backoff computed by [`crate::retry::backoff_delay`]. The body is never
//! buffered in memory.

use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, RetryScope, with_retry};
use crate::utils::{ensure_parent_dir, remove_file_quietly};

/// Per-call download settings
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Total attempts including the first
    pub retries: u32,
    /// Deadline for opening the stream (connect and response headers), and
    /// the longest gap tolerated between two body chunks
    pub timeout: Duration,
    /// Base of the exponential backoff
    pub backoff_base: Duration,
    /// Upper bound of the jitter added to each backoff
    pub max_jitter: Duration,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for DownloadOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            retries: config.retries,
            timeout: config.timeout,
            backoff_base: config.backoff_base,
            max_jitter: config.max_jitter,
            headers: config.headers.clone(),
        }
    }
}

impl DownloadOptions {
    fn retry_policy(&self) -> RetryPolicy {
        // Every failure mode gets another attempt, including 4xx
        RetryPolicy::new(self.retries, self.backoff_base)
            .with_jitter(self.max_jitter)
            .with_scope(RetryScope::All)
    }
}

/// Streams remote media to disk
#[derive(Clone, Debug)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader with its own connection pool
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Create a downloader sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`, returning the number of bytes written
    ///
    /// An existing file at `dest` is overwritten. When every attempt fails,
    /// the error of the last attempt is returned and nothing is left at
    /// `dest`.
    pub async fn download(&self, url: &str, dest: &Path, options: &DownloadOptions) -> Result<u64> {
        let policy = options.retry_policy();
        let mut attempt = 0u32;

        let bytes = with_retry(&policy, move || {
            attempt += 1;
            let n = attempt;
            async move {
                tracing::debug!(url, dest = %dest.display(), attempt = n, "download attempt");
                let result = self.attempt(url, dest, options).await;
                if result.is_err() {
                    remove_file_quietly(dest).await;
                }
                result
            }
        })
        .await?;

        tracing::debug!(url, dest = %dest.display(), bytes, "download complete");
        Ok(bytes)
    }

    async fn attempt(&self, url: &str, dest: &Path, options: &DownloadOptions) -> Result<u64> {
        let mut request = self.client.get(url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        // The deadline covers opening the stream only; a long body is fine
        let response = tokio::time::timeout(options.timeout, request.send())
            .await
            .map_err(|_| timeout_error(url, options))??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        self.stream_to_file(response, url, dest, options).await
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        url: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<u64> {
        ensure_parent_dir(dest).await?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::fs(dest, e))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        // A stalled body fails once no chunk arrives for a whole deadline
        while let Some(chunk) = tokio::time::timeout(options.timeout, body.next())
            .await
            .map_err(|_| timeout_error(url, options))?
        {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::fs(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::fs(dest, e))?;
        drop(file);

        // Size on disk is authoritative
        let size = tokio::fs::metadata(dest)
            .await
            .map_err(|e| Error::fs(dest, e))?
            .len();
        if size == 0 {
            return Err(Error::EmptyFile {
                path: dest.to_path_buf(),
            });
        }
        if size != written {
            tracing::warn!(dest = %dest.display(), size, written, "size on disk differs from bytes streamed");
        }
        Ok(size)
    }
}

fn timeout_error(url: &str, options: &DownloadOptions) -> Error {
    Error::Timeout {
        url: url.to_string(),
        timeout: options.timeout,
    }
}
