//! HTTP transport for the field data server

use crate::config::ServerConfig;
use crate::error::Result;
use crate::models::{Operation, OperationType};
use crate::sync::api::{ApiClient, ApplyOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// JSON-over-HTTP transport
///
/// Mutations map onto REST verbs against
/// `{base}/api/{data_type}/{resource_id}`: create posts, update puts,
/// delete deletes. A 409 response is expected to carry the server's current
/// snapshot of the resource as its JSON body.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpApiClient {
    /// Build a client with the given per-request timeout
    pub fn new(config: &ServerConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, operation: &Operation) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url,
            urlencoding::encode(&operation.data_type),
            urlencoding::encode(&operation.resource_id)
        )
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn apply(&self, operation: &Operation) -> ApplyOutcome {
        let url = self.endpoint(operation);
        let request = match operation.op_type {
            OperationType::Create => self.client.post(&url).json(&operation.payload),
            OperationType::Update => self.client.put(&url).json(&operation.payload),
            OperationType::Delete => self.client.delete(&url),
        };
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return ApplyOutcome::Transient {
                    reason: format!("request failed: {e}"),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            return ApplyOutcome::Acked;
        }

        if status == StatusCode::CONFLICT {
            // The body should be the server's snapshot; without it there is
            // nothing to diff against, so treat the attempt as retryable
            return match response.json().await {
                Ok(server_version) => ApplyOutcome::VersionConflict { server_version },
                Err(e) => ApplyOutcome::Transient {
                    reason: format!("unreadable conflict body: {e}"),
                },
            };
        }

        let body = response.text().await.unwrap_or_default();
        let reason = describe_failure(status, &body);
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            ApplyOutcome::Transient { reason }
        } else {
            ApplyOutcome::Permanent { reason }
        }
    }
}

/// Render an HTTP failure as a short operator-facing message
///
/// Prefers the server's own `error` or `message` field when the body is
/// JSON, then the raw body, then the bare status line.
fn describe_failure(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return format!("{message} (HTTP {})", status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {}: {trimmed}", status.as_u16())
    }
}
