use std::sync::Arc;

use thiserror::Error;

use super::state::SessionState;
use crate::core::transport::{DataChannelHandle, TransportError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the signaling session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network or protocol failure before the session was established
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Operation not valid in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A negotiation is already in flight
    #[error("A negotiation is already in progress")]
    AlreadyActive,

    /// A bounded suspension expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The host transport rejected an operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session could not be built from its configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SessionError {
    /// Human-readable cause, without the category prefix.
    pub fn cause(&self) -> String {
        match self {
            SessionError::NegotiationFailed(cause)
            | SessionError::Timeout(cause)
            | SessionError::InvalidConfiguration(cause) => cause.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for signaling operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Callbacks
// =============================================================================

/// Receives the session identifier when minted, `None` once it is invalid.
///
/// Invoked synchronously in the same step that applies the remote
/// description, so observers never see an identifier for a session whose
/// answer was not applied without also seeing the revocation.
pub type SessionIdCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Receives the in-band data channel created during negotiation.
pub type DataChannelCallback = Arc<dyn Fn(DataChannelHandle) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_strips_category() {
        let err = SessionError::NegotiationFailed("Server returned 500".to_string());
        assert_eq!(err.cause(), "Server returned 500");
        assert_eq!(err.to_string(), "Negotiation failed: Server returned 500");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SessionError::InvalidState {
            operation: "start",
            state: SessionState::Established,
        };
        assert_eq!(err.cause(), "Cannot start while Established");
    }

    #[test]
    fn test_transport_error_converts() {
        let err: SessionError = TransportError::Closed.into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(err.cause(), "Transport error: Transport closed");
    }
}
