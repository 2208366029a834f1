use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::core::control::{ControlSubstrate, SubstrateEvent};
use crate::core::media::{MediaKind, SharedMediaStream};

// =============================================================================
// Error Types
// =============================================================================

/// Errors reported by a peer transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Offer creation failed
    #[error("Offer creation failed: {0}")]
    OfferFailed(String),

    /// A local or remote description was rejected
    #[error("Description rejected: {0}")]
    DescriptionRejected(String),

    /// Data channel could not be created
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// The transport has been closed
    #[error("Transport closed")]
    Closed,

    /// Host-specific failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Session Descriptions
// =============================================================================

/// Role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// A session description blob with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// ICE candidate gathering progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceGatheringState {
    #[default]
    New,
    Gathering,
    Complete,
}

impl fmt::Display for IceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceGatheringState::New => write!(f, "new"),
            IceGatheringState::Gathering => write!(f, "gathering"),
            IceGatheringState::Complete => write!(f, "complete"),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// In-band data channel created on the transport, usable as a control
/// substrate.
pub struct DataChannelHandle {
    pub substrate: Arc<dyn ControlSubstrate>,
    pub events: mpsc::Receiver<SubstrateEvent>,
}

/// Callback invoked by the transport when the remote peer adds a track.
pub type RemoteTrackCallback = Arc<dyn Fn(MediaKind, SharedMediaStream) + Send + Sync>;

/// Host-managed peer connection.
///
/// Methods take `&self`; implementations use interior mutability the way the
/// host's connection object does.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Declare interest in receiving one track of `kind` without sending any.
    fn add_recv_only_transceiver(&self, kind: MediaKind) -> TransportResult<()>;

    /// Register the handler for tracks added by the remote peer.
    fn on_track(&self, callback: RemoteTrackCallback);

    /// Create the in-band data channel.
    fn create_data_channel(&self, label: &str) -> TransportResult<DataChannelHandle>;

    /// Create a local offer.
    async fn create_offer(&self) -> TransportResult<SessionDescription>;

    /// Apply the local description. ICE gathering starts here.
    async fn set_local_description(&self, description: SessionDescription) -> TransportResult<()>;

    /// Current local description, including gathered candidates.
    fn local_description(&self) -> Option<SessionDescription>;

    /// Watch ICE gathering progress.
    fn ice_gathering_state(&self) -> watch::Receiver<IceGatheringState>;

    /// Apply the remote answer.
    async fn set_remote_description(&self, description: SessionDescription)
    -> TransportResult<()>;

    /// Whether the transport has been closed or disposed.
    fn is_closed(&self) -> bool;

    /// Close the transport. Synchronous and idempotent.
    fn close(&self);
}

/// Produces a fresh transport for each negotiation attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> TransportResult<Arc<dyn PeerTransport>>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> TransportResult<Arc<dyn PeerTransport>> + Send + Sync,
{
    fn create(&self) -> TransportResult<Arc<dyn PeerTransport>> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_wire_shape() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json["sdp"], "v=0");
        assert_eq!(json["type"], "offer");

        let answer: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0","type":"answer"}"#).unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
    }

    #[test]
    fn test_ice_state_display() {
        assert_eq!(IceGatheringState::default().to_string(), "new");
        assert_eq!(IceGatheringState::Complete.to_string(), "complete");
    }

    #[test]
    fn test_closure_is_a_factory() {
        let factory = || -> TransportResult<Arc<dyn PeerTransport>> {
            Err(TransportError::Internal("no host".to_string()))
        };
        assert!(matches!(
            TransportFactory::create(&factory),
            Err(TransportError::Internal(_))
        ));
    }
}
