//! Ollama generate client.
//!
//! Sends a single non-streaming `/api/generate` request per query and maps
//! every transport or HTTP outcome onto [`InferenceError`]. No retries, no
//! fallback chain: one call in, one result out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::types::{GenerateRequest, GenerateResponse};
use crate::config::RelayConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout. The total request timeout comes from config.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the startup health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

// ─── Backend trait ───────────────────────────────────────────────────────────

/// Anything that can turn a prompt into model output.
///
/// The orchestrator only talks to this trait, so tests can substitute a
/// recording or failing backend for the HTTP client.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one completion. Exactly one outbound call; never retried.
    async fn query(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// HTTP client for the local Ollama endpoint.
pub struct InferenceClient {
    http: HttpClient,
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl InferenceClient {
    /// Create a client for `endpoint` with a total per-request `timeout`.
    ///
    /// Does NOT check connectivity; see [`InferenceClient::health_check`].
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let connect_timeout = CONNECT_TIMEOUT.min(timeout);
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
            connect_timeout,
        })
    }

    /// Create a client from the relay configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, InferenceError> {
        Self::new(
            config.endpoint_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// The generate endpoint this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check whether the endpoint's server is reachable.
    ///
    /// Probes the sibling `tags` route (`/api/generate` → `/api/tags`), which
    /// lists local models without running inference.
    pub async fn health_check(&self) -> bool {
        let url = match reqwest::Url::parse(&self.endpoint).and_then(|u| u.join("tags")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "cannot derive health URL");
                return false;
            }
        };

        match self.http.get(url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Map a reqwest failure onto the transport class of [`InferenceError`].
    fn transport_error(&self, err: reqwest::Error) -> InferenceError {
        self.classify_failure(err.is_timeout(), err.is_connect(), err.to_string())
    }

    /// A connect timeout means the server never answered the handshake; only
    /// a timeout after connecting counts against the request budget.
    fn classify_failure(&self, timed_out: bool, connecting: bool, reason: String) -> InferenceError {
        match (timed_out, connecting) {
            (true, false) => InferenceError::Timeout {
                duration_secs: self.timeout.as_secs(),
            },
            (true, true) => InferenceError::Transport {
                endpoint: self.endpoint.clone(),
                reason: format!(
                    "connection not established within {}s",
                    self.connect_timeout.as_secs()
                ),
            },
            (false, _) => InferenceError::Transport {
                endpoint: self.endpoint.clone(),
                reason,
            },
        }
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn query(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, InferenceError> {
        let body = GenerateRequest::new(model, prompt, temperature);

        // Metadata only; prompts can be large and personal.
        tracing::info!(
            url = %self.endpoint,
            model = %body.model,
            temperature = body.temperature,
            prompt_len = body.prompt.len(),
            "sending generate request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "inference endpoint returned error status");
            return Err(InferenceError::Status {
                status: status.as_u16(),
            });
        }

        let body_text = response.text().await.map_err(|e| self.transport_error(e))?;

        let parsed: GenerateResponse =
            serde_json::from_str(&body_text).map_err(|e| InferenceError::Transport {
                endpoint: self.endpoint.clone(),
                reason: format!("invalid response body: {e}"),
            })?;

        let text = parsed.into_text();
        tracing::info!(response_len = text.len(), "generate request completed");
        Ok(text)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
