//! Base traits and types for the control channel.
//!
//! The control channel is substrate-agnostic: it runs over the negotiated
//! connection's in-band data channel or over an independent socket. Anything
//! that can send text and report open, message and close events qualifies.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::messages::ControlMessage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the control channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Send attempted before the substrate reported open
    #[error("Control channel not ready")]
    ChannelNotReady,

    /// Send attempted after the channel closed
    #[error("Control channel closed")]
    Closed,

    /// Outbound message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Inbound payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The underlying substrate failed
    #[error("Substrate error: {0}")]
    Substrate(String),

    /// Channel did not open in time
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for control channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

// =============================================================================
// Substrate
// =============================================================================

/// Event reported by a substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateEvent {
    /// The substrate is ready to carry messages
    Open,
    /// A text payload arrived
    Message(String),
    /// The substrate closed; no further events follow
    Close,
}

/// Transport carrying control payloads.
///
/// Inbound events are delivered separately, through the receiver handed out
/// alongside the substrate when it is created. Delivery order on a single
/// substrate is the send order.
#[async_trait]
pub trait ControlSubstrate: Send + Sync {
    /// Short label for logs (e.g. "chat" or the socket URL).
    fn label(&self) -> &str;

    /// Send a text payload. No delivery acknowledgment.
    async fn send(&self, text: String) -> ChannelResult<()>;

    /// Close the substrate. Idempotent.
    fn close(&self);
}

// =============================================================================
// Channel State
// =============================================================================

/// Lifecycle of a control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Waiting for the substrate to open
    #[default]
    Connecting,
    /// Ready to send and receive
    Open,
    /// Closed, by either side
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for decoded inbound messages.
pub type ControlMessageCallback =
    Arc<dyn Fn(ControlMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for channel state changes.
pub type ChannelStateCallback = Arc<dyn Fn(ChannelState) + Send + Sync>;
