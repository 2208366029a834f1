//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::audio::AudioError;
use crate::core::control::ChannelError;
use crate::core::human::HumanInputError;
use crate::core::signaling::SessionError;
use crate::core::transport::TransportError;

/// Any error surfaced by the avatar client.
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    HumanInput(#[from] HumanInputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation needs a component the current mode does not have
    #[error("Not supported in {mode} mode: {operation}")]
    Unsupported {
        mode: &'static str,
        operation: &'static str,
    },

    /// The orchestrator was shut down
    #[error("Avatar has been shut down")]
    ShutDown,
}

pub type AvatarResult<T> = Result<T, AvatarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_keep_message() {
        let err: AvatarError = ChannelError::ChannelNotReady.into();
        assert_eq!(err.to_string(), "Control channel not ready");

        let err: AvatarError = SessionError::AlreadyActive.into();
        assert!(matches!(err, AvatarError::Session(SessionError::AlreadyActive)));
    }

    #[test]
    fn test_unsupported_message() {
        let err = AvatarError::Unsupported {
            mode: "synthesized",
            operation: "connect",
        };
        assert_eq!(err.to_string(), "Not supported in synthesized mode: connect");
    }
}
