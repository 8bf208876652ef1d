//! Single-shot JSON exchange with a hard deadline
//!
//! [`Fetcher::fetch`] performs exactly one request: no retry and no backoff.
//! Callers that want retries wrap it with [`crate::retry::with_retry`].
//!
//! A call fails when:
//! - no complete response (headers and body) arrives within the deadline
//! - the HTTP status is not a success
//! - the body is not JSON (after transparent gzip/deflate/brotli decoding)
//! - the payload carries a `result` code other than [`SUCCESS_RESULT`]

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::EndpointConfig;
use crate::error::{Error, Result, ResultCode};

/// Result code the platform uses for success
pub const SUCCESS_RESULT: i64 = 1;

/// One request to send through a [`Fetcher`]
#[derive(Clone, Debug)]
pub struct FetchRequest {
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl FetchRequest {
    /// Request with an explicit method
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Request described by an endpoint from the configuration
    ///
    /// The endpoint body, if any, becomes the JSON body.
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Result<Self> {
        let method = Method::from_bytes(endpoint.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                Error::config(
                    "api.endpoint.method",
                    format!("unknown HTTP method {:?}", endpoint.method),
                )
            })?;
        let mut request = Self::new(method, endpoint.url.clone()).headers(&endpoint.headers);
        request.body = endpoint.body.clone();
        Ok(request)
    }

    /// Add one header (overrides defaults and earlier values)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add several headers
    pub fn headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the fetcher's default deadline for this request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Performs single JSON exchanges
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher with its own connection pool
    pub fn new(default_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        Ok(Self::with_client(client, default_timeout))
    }

    /// Create a fetcher sharing an existing client
    pub fn with_client(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    /// Send `request` and return the decoded JSON payload
    pub async fn fetch(&self, request: FetchRequest) -> Result<Value> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let url = request.url.clone();

        tracing::debug!(method = %request.method, url = %url, timeout_ms = timeout.as_millis(), "fetching");

        // The deadline covers headers and body; dropping the future aborts the exchange
        let value = tokio::time::timeout(timeout, self.exchange(request))
            .await
            .map_err(|_| Error::Timeout {
                url: url.clone(),
                timeout,
            })??;

        check_result_code(&value)?;
        Ok(value)
    }

    /// Like [`fetch`](Self::fetch), deserializing the payload into `T`
    pub async fn fetch_as<T: DeserializeOwned>(&self, request: FetchRequest) -> Result<T> {
        let url = request.url.clone();
        let value = self.fetch(request).await?;
        serde_json::from_value(value).map_err(|e| Error::Decode {
            url,
            reason: e.to_string(),
        })
    }

    async fn exchange(&self, request: FetchRequest) -> Result<Value> {
        let FetchRequest {
            url,
            method,
            headers,
            body,
            ..
        } = request;

        let mut builder = self.client.request(method, &url);
        // RequestBuilder::header appends, so the default goes in only when absent
        if !headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(reqwest::header::CONTENT_TYPE.as_str()))
        {
            builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| classify(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(e, &url))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

fn classify(e: reqwest::Error, url: &str) -> Error {
    if e.is_decode() {
        Error::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        Error::Network(e)
    }
}

/// Reject payloads whose result code is present and not a success
///
/// The code is read from the top-level `result` field, falling back to
/// `data.result` (the like endpoint nests it there). A `null` code counts as
/// absent. Only the integer [`SUCCESS_RESULT`] passes; strings, booleans and
/// other numbers are failures.
pub fn check_result_code(value: &Value) -> Result<()> {
    let present = |v: &Value| v.get("result").filter(|c| !c.is_null()).is_some();
    let scope = if present(value) {
        value
    } else {
        match value.get("data") {
            Some(data) if present(data) => data,
            _ => return Ok(()),
        }
    };

    let code = match &scope["result"] {
        Value::Number(n) => match n.as_i64() {
            Some(SUCCESS_RESULT) => return Ok(()),
            Some(code) => ResultCode::Numeric(code),
            None => ResultCode::Other(n.to_string()),
        },
        other => ResultCode::Other(other.to_string()),
    };

    let message = ["error_msg", "message", "msg"]
        .iter()
        .find_map(|k| scope.get(*k).and_then(Value::as_str))
        .map(str::to_string);
    Err(Error::Application { code, message })
}
