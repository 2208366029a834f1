//! Session negotiation with the remote media server.
//!
//! [`SignalingSession`] drives a host [`PeerTransport`](crate::core::transport::PeerTransport)
//! through the offer/answer exchange against `POST /offer`, binds the remote
//! tracks it receives and publishes the session identifier minted by the
//! server.

mod base;
mod config;
pub mod messages;
mod session;
mod state;

pub use base::{DataChannelCallback, SessionError, SessionIdCallback, SessionResult};
pub use config::{
    DEFAULT_AVATAR_ID, DEFAULT_DATA_CHANNEL_LABEL, DEFAULT_SERVER_URL, SignalingConfig,
};
pub use messages::{AnswerResponse, OfferRequest};
pub use session::SignalingSession;
pub use state::SessionState;
