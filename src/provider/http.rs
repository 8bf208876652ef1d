//! HTTP-backed work list and like service

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{LikeService, RawWork, WorkListProvider};
use crate::config::{ApiConfig, EndpointConfig};
use crate::error::{Error, Result, ResultCode};
use crate::fetch::{FetchRequest, Fetcher, check_result_code};
use crate::types::LikeAction;

/// Fetches the liked-works list from a configured endpoint
#[derive(Clone, Debug)]
pub struct HttpWorkListProvider {
    fetcher: Fetcher,
    endpoint: EndpointConfig,
    list_pointer: String,
}

impl HttpWorkListProvider {
    /// Provider for `api.list`
    ///
    /// Fails with [`Error::Config`] when no list endpoint is configured.
    pub fn from_config(fetcher: Fetcher, api: &ApiConfig) -> Result<Self> {
        let endpoint = api
            .list
            .clone()
            .ok_or_else(|| Error::config("api.list", "no list endpoint configured"))?;
        Ok(Self::new(fetcher, endpoint, api.list_pointer.clone()))
    }

    /// Provider for an explicit endpoint; `list_pointer` locates the array
    pub fn new(fetcher: Fetcher, endpoint: EndpointConfig, list_pointer: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint,
            list_pointer: list_pointer.into(),
        }
    }
}

#[async_trait]
impl WorkListProvider for HttpWorkListProvider {
    async fn fetch_works(&self) -> Result<Vec<RawWork>> {
        let request = FetchRequest::from_endpoint(&self.endpoint)?;
        let payload = self.fetcher.fetch(request).await?;
        check_graphql_errors(&payload)?;

        // An absent list means nothing is liked
        let entries: &[Value] = match payload.pointer(&self.list_pointer) {
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(Value::Null) | None => &[],
            Some(other) => {
                return Err(Error::Decode {
                    url: self.endpoint.url.clone(),
                    reason: format!(
                        "expected an array at {}, found {}",
                        self.list_pointer,
                        json_kind(other)
                    ),
                });
            }
        };

        let mut works = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<RawWork>(entry.clone()) {
                Ok(work) => works.push(work),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping undecodable work record");
                }
            }
        }

        tracing::info!(url = %self.endpoint.url, count = works.len(), "fetched liked works");
        Ok(works)
    }
}

/// Toggles likes through a configured endpoint
///
/// A GET endpoint receives `photoId`, `principalId` and `cancel` as query
/// parameters. Any other method sends the endpoint's body template with
/// `variables` set to `{ photoId, photoAuthorId, cancel }`; when the template
/// names an `operationName`, the result code under `data.<operationName>` is
/// checked as well.
#[derive(Clone, Debug)]
pub struct HttpLikeService {
    fetcher: Fetcher,
    endpoint: EndpointConfig,
}

impl HttpLikeService {
    /// Service for `api.like`
    ///
    /// Fails with [`Error::Config`] when no like endpoint is configured.
    pub fn from_config(fetcher: Fetcher, api: &ApiConfig) -> Result<Self> {
        let endpoint = api
            .like
            .clone()
            .ok_or_else(|| Error::config("api.like", "no like endpoint configured"))?;
        Ok(Self::new(fetcher, endpoint))
    }

    /// Service for an explicit endpoint
    pub fn new(fetcher: Fetcher, endpoint: EndpointConfig) -> Self {
        Self { fetcher, endpoint }
    }

    fn build_request(&self, work_id: &str, user_id: &str, cancel: u8) -> Result<FetchRequest> {
        let mut endpoint = self.endpoint.clone();

        if endpoint.method.trim().eq_ignore_ascii_case("GET") {
            let mut url = url::Url::parse(&endpoint.url).map_err(|e| {
                Error::config("api.like.url", format!("invalid like url: {e}"))
            })?;
            url.query_pairs_mut()
                .append_pair("photoId", work_id)
                .append_pair("principalId", user_id)
                .append_pair("cancel", &cancel.to_string());
            endpoint.url = url.into();
        } else {
            let mut body = endpoint.body.take().unwrap_or_else(|| json!({}));
            if let Value::Object(map) = &mut body {
                map.insert(
                    "variables".into(),
                    json!({
                        "photoId": work_id,
                        "photoAuthorId": user_id,
                        "cancel": cancel,
                    }),
                );
            }
            endpoint.body = Some(body);
        }

        FetchRequest::from_endpoint(&endpoint)
    }

    fn operation_name(&self) -> Option<&str> {
        self.endpoint
            .body
            .as_ref()
            .and_then(|b| b.get("operationName"))
            .and_then(Value::as_str)
    }
}

#[async_trait]
impl LikeService for HttpLikeService {
    async fn set_like(&self, work_id: &str, user_id: &str, action: LikeAction) -> Result<()> {
        if work_id.trim().is_empty() || user_id.trim().is_empty() {
            return Err(Error::Validation("missing work id or user id".into()));
        }

        let request = self.build_request(work_id, user_id, action.cancel_flag())?;
        let payload = self.fetcher.fetch(request).await?;
        check_graphql_errors(&payload)?;

        if let Some(op) = self.operation_name()
            && let Some(scope) = payload.get("data").and_then(|d| d.get(op))
        {
            check_result_code(scope)?;
        }

        tracing::debug!(work_id, user_id, ?action, "like state updated");
        Ok(())
    }
}

/// Surface a GraphQL-style `errors[0].message` as an application error
fn check_graphql_errors(payload: &Value) -> Result<()> {
    let message = payload
        .get("errors")
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str);
    match message {
        Some(message) => Err(Error::Application {
            code: ResultCode::Numeric(0),
            message: Some(message.to_string()),
        }),
        None => Ok(()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
