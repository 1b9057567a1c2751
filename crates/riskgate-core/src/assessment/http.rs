//! HTTP assessment backend.
//!
//! Posts `{model, task, input}` as JSON to a configured endpoint and returns
//! the JSON response body. Schema checks happen in the provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::collaborators::AssessmentBackend;
use crate::config::AssessmentConfig;
use crate::domain::{AssessmentError, AssessmentRequest};

/// Language-model gateway reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAssessmentBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpAssessmentBackend {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AssessmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("riskgate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AssessmentError::BackendUnavailable(format!("http client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            timeout,
            http_client,
        })
    }

    /// Build from the `[assessment]` config section.
    ///
    /// Returns `Ok(None)` when no endpoint is configured. The bearer token is
    /// read from the environment variable named by `api_key_env`.
    pub fn from_config(
        config: &AssessmentConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, AssessmentError> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        let mut backend = Self::new(endpoint.clone(), config.model.clone(), timeout)?;
        if let Some(var) = &config.api_key_env {
            backend.api_key = std::env::var(var).ok().filter(|k| !k.is_empty());
        }
        Ok(Some(backend))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &AssessmentRequest) -> Value {
        json!({
            "model": self.model,
            "task": request.task,
            "input": request.input,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> AssessmentError {
        if err.is_timeout() {
            AssessmentError::Timeout {
                limit_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AssessmentError::BackendUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl AssessmentBackend for HttpAssessmentBackend {
    async fn complete(&self, request: &AssessmentRequest) -> Result<Value, AssessmentError> {
        debug!(endpoint = %self.endpoint, task = %request.task, "posting assessment request");

        let mut builder = self.http_client.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(&self.endpoint, status));
        }

        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&text)
            .map_err(|e| AssessmentError::MalformedResponse(format!("response is not JSON: {e}")))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Map a non-success status. Only throttling, request timeouts and server
/// errors are worth retrying.
fn status_error(endpoint: &str, status: reqwest::StatusCode) -> AssessmentError {
    let detail = format!("{endpoint} returned {status}");
    if status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    {
        AssessmentError::BackendUnavailable(detail)
    } else {
        AssessmentError::Rejected(detail)
    }
}
