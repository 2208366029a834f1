//! Outbound human input (`POST /human`).
//!
//! Shares the session identifier minted during negotiation. The identifier is
//! swapped in when the session publishes it and cleared when it is revoked,
//! so text is never sent on behalf of a dead session.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HumanInputError {
    /// No negotiated session to attribute the input to
    #[error("No active session")]
    NoSession,

    #[error("Empty input")]
    EmptyText,

    #[error("Request failed: {0}")]
    Request(String),

    /// Non-2xx response
    #[error("Server returned {0}")]
    Status(u16),
}

pub type HumanInputResult<T> = Result<T, HumanInputError>;

fn default_kind() -> String {
    "chat".to_string()
}

fn default_interrupt() -> bool {
    true
}

/// Request body of the human input endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInput {
    pub text: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Interrupt the avatar if it is speaking
    #[serde(default = "default_interrupt")]
    pub interrupt: bool,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl HumanInput {
    pub fn chat(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: default_kind(),
            interrupt: default_interrupt(),
            session_id: session_id.into(),
        }
    }
}

/// Client for the human input endpoint.
pub struct HumanInputClient {
    url: String,
    http: reqwest::Client,
    timeout: Duration,
    session_id: ArcSwapOption<String>,
}

impl HumanInputClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            timeout,
            session_id: ArcSwapOption::empty(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Adopt (or with `None`, forget) the negotiated session identifier.
    pub fn set_session_id(&self, session_id: Option<String>) {
        self.session_id.store(session_id.map(Arc::new));
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.load_full().map(|id| id.as_ref().clone())
    }

    /// Send chat text that interrupts the avatar.
    pub async fn send_text(&self, text: &str) -> HumanInputResult<()> {
        let session_id = self.session_id().ok_or(HumanInputError::NoSession)?;
        self.send(&HumanInput::chat(text, session_id)).await
    }

    pub async fn send(&self, input: &HumanInput) -> HumanInputResult<()> {
        if input.session_id.is_empty() {
            return Err(HumanInputError::NoSession);
        }
        if input.text.trim().is_empty() {
            return Err(HumanInputError::EmptyText);
        }

        tracing::debug!("Sending human input for session {}", input.session_id);
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(input)
            .send()
            .await
            .map_err(|e| HumanInputError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Human input rejected with status {}", status);
            return Err(HumanInputError::Status(status.as_u16()));
        }
        Ok(())
    }
}
