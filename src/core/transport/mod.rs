//! Peer transport capability.
//!
//! The media connection itself (peer connection, ICE agent, DTLS) belongs to
//! the host runtime. The signaling session drives it through
//! [`PeerTransport`], and obtains a fresh transport for every negotiation
//! attempt from a [`TransportFactory`].

mod base;

pub use base::{
    DataChannelHandle, IceGatheringState, PeerTransport, RemoteTrackCallback, SdpType,
    SessionDescription, TransportError, TransportFactory, TransportResult,
};
