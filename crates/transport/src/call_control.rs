//! Call-control REST side channel
//!
//! Out-of-band call actions (hangup, transfer) against the provider's REST
//! API. Everything here is best-effort from the media path's point of view:
//! callers log failures, they never tear down audio because of them.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use voice_gateway_config::constants::call_control::ALREADY_TERMINATED_CODE;
use voice_gateway_config::CallControlConfig;

/// Result of a hangup request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupOutcome {
    /// The call was ended by this request
    Terminated,
    /// The provider reports the call had already ended
    AlreadyTerminated,
}

impl HangupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupOutcome::Terminated => "terminated",
            HangupOutcome::AlreadyTerminated => "already_terminated",
        }
    }
}

/// Call-control errors
#[derive(Error, Debug)]
pub enum CallControlError {
    #[error("Missing call_control_id or auth token")]
    MissingCredentials,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CallControlError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CallControlError::MissingCredentials => "missing_credentials",
            CallControlError::Network(_) => "network",
            CallControlError::Timeout => "timeout",
            CallControlError::Api { .. } => "api",
            CallControlError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for CallControlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallControlError::Timeout
        } else {
            CallControlError::Network(err.to_string())
        }
    }
}

/// Transfer destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl TransferRequest {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Out-of-band call actions
#[async_trait]
pub trait CallControl: Send + Sync + 'static {
    /// End the call
    async fn hangup(
        &self,
        call_control_id: &str,
        auth_token: &str,
    ) -> Result<HangupOutcome, CallControlError>;

    /// Transfer the call to another number or SIP URI
    async fn transfer(
        &self,
        call_control_id: &str,
        auth_token: &str,
        request: &TransferRequest,
    ) -> Result<(), CallControlError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Whether an error body carries the "call already ended" code
pub fn is_already_terminated(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) else {
        return false;
    };
    parsed.errors.iter().any(|entry| match &entry.code {
        Some(serde_json::Value::String(code)) => code == ALREADY_TERMINATED_CODE,
        Some(serde_json::Value::Number(code)) => code.to_string() == ALREADY_TERMINATED_CODE,
        _ => false,
    })
}

/// Call control over the Telnyx v2 REST API
#[derive(Debug, Clone)]
pub struct TelnyxCallControl {
    client: Client,
    base_url: String,
}

impl TelnyxCallControl {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CallControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CallControlError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &CallControlConfig) -> Result<Self, CallControlError> {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn action_url(&self, call_control_id: &str, action: &str) -> String {
        format!(
            "{}/calls/{}/actions/{}",
            self.base_url, call_control_id, action
        )
    }
}

fn check_credentials(call_control_id: &str, auth_token: &str) -> Result<(), CallControlError> {
    if call_control_id.is_empty() || auth_token.is_empty() {
        return Err(CallControlError::MissingCredentials);
    }
    Ok(())
}

#[async_trait]
impl CallControl for TelnyxCallControl {
    async fn hangup(
        &self,
        call_control_id: &str,
        auth_token: &str,
    ) -> Result<HangupOutcome, CallControlError> {
        check_credentials(call_control_id, auth_token)?;

        let response = self
            .client
            .post(self.action_url(call_control_id, "hangup"))
            .bearer_auth(auth_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(call_control_id, "Call terminated");
            return Ok(HangupOutcome::Terminated);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && is_already_terminated(&body) {
            tracing::debug!(call_control_id, "Call was already terminated");
            return Ok(HangupOutcome::AlreadyTerminated);
        }

        Err(CallControlError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn transfer(
        &self,
        call_control_id: &str,
        auth_token: &str,
        request: &TransferRequest,
    ) -> Result<(), CallControlError> {
        check_credentials(call_control_id, auth_token)?;

        let response = self
            .client
            .post(self.action_url(call_control_id, "transfer"))
            .bearer_auth(auth_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallControlError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(call_control_id, to = %request.to, "Call transferred");
        Ok(())
    }
}
