//! HTTP Surface
//!
//! The core's outbound HTTP operations behind a trait seam so tests can
//! substitute a mock: task submission (whose streamed response body becomes
//! the request stream), cancellation, and identity discovery. Discovery
//! endpoints carry a bounded timeout; submission is unbounded but abortable
//! through the returned stream handle.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::models::protocol::SourceEvent;
use crate::models::task::TaskOptions;
use crate::services::stream::{self, StreamHandle};
use crate::utils::error::{CoreError, CoreResult};

/// Server acknowledgement for a cancellation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a TaskOptions>,
}

#[derive(Debug, Serialize)]
struct CancelBody<'a> {
    reason: &'a str,
    identity: &'a str,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    #[serde(rename = "userId")]
    user_id: String,
}

/// Outbound HTTP operations the core depends on
#[async_trait]
pub trait CommandApi: Send + Sync {
    /// Submit a command; the response body is read as a request stream
    /// whose frames are forwarded to `events_tx`.
    async fn submit(
        &self,
        command: &str,
        options: &TaskOptions,
        events_tx: mpsc::Sender<SourceEvent>,
    ) -> CoreResult<StreamHandle>;

    /// Ask the server to cancel a task
    async fn cancel_task(
        &self,
        task_id: &str,
        reason: &str,
        identity: &str,
    ) -> CoreResult<CancelAck>;

    /// Resolve the caller's identity from the server
    async fn whoami(&self) -> CoreResult<String>;
}

/// Production [`CommandApi`] backed by reqwest
pub struct HttpCommandApi {
    client: reqwest::Client,
    base_url: Url,
    discovery_timeout: Duration,
}

impl HttpCommandApi {
    pub fn new(http_base_url: &str, discovery_timeout_ms: u64) -> CoreResult<Self> {
        // A trailing slash keeps Url::join from replacing the last path segment
        let normalized = if http_base_url.ends_with('/') {
            http_base_url.to_string()
        } else {
            format!("{}/", http_base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| CoreError::validation(format!("invalid http_base_url: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            discovery_timeout: Duration::from_millis(discovery_timeout_ms),
        })
    }

    fn endpoint(&self, path: &str) -> CoreResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CoreError::internal(format!("bad endpoint path {}: {}", path, e)))
    }
}

#[async_trait]
impl CommandApi for HttpCommandApi {
    async fn submit(
        &self,
        command: &str,
        options: &TaskOptions,
        events_tx: mpsc::Sender<SourceEvent>,
    ) -> CoreResult<StreamHandle> {
        let body = SubmitBody {
            command,
            options: Some(options),
        };

        let response = self
            .client
            .post(self.endpoint("tasks")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::submit_failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::submit_failed(e.to_string()))?;

        let stream_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        stream::spawn_reader(response, stream_id.clone(), events_tx, cancel.clone());

        Ok(StreamHandle::new(stream_id, cancel))
    }

    async fn cancel_task(
        &self,
        task_id: &str,
        reason: &str,
        identity: &str,
    ) -> CoreResult<CancelAck> {
        let body = CancelBody { reason, identity };

        let response = self
            .client
            .put(self.endpoint(&format!("tasks/{}/cancel", task_id))?)
            .timeout(self.discovery_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::cancel_failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::cancel_failed(e.to_string()))?;

        response
            .json::<CancelAck>()
            .await
            .map_err(|e| CoreError::cancel_failed(e.to_string()))
    }

    async fn whoami(&self) -> CoreResult<String> {
        let response = self
            .client
            .get(self.endpoint("whoami")?)
            .timeout(self.discovery_timeout)
            .send()
            .await?
            .error_for_status()?;

        let body: WhoamiResponse = response.json().await?;
        Ok(body.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joining_preserves_base_path() {
        let api = HttpCommandApi::new("http://localhost:3000/api", 8000).unwrap();
        assert_eq!(
            api.endpoint("tasks").unwrap().as_str(),
            "http://localhost:3000/api/tasks"
        );
        assert_eq!(
            api.endpoint("tasks/A/cancel").unwrap().as_str(),
            "http://localhost:3000/api/tasks/A/cancel"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpCommandApi::new("not a url", 8000).is_err());
    }

    #[test]
    fn test_cancel_ack_deserialization() {
        let ack: CancelAck = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(ack.success);
        assert!(ack.error.is_none());

        let ack: CancelAck =
            serde_json::from_str(r#"{"success":false,"error":"task already finished"}"#).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.error.as_deref(), Some("task already finished"));
    }

    #[test]
    fn test_submit_body_omits_empty_options() {
        let body = SubmitBody {
            command: "hello",
            options: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("options").is_none());
    }
}
