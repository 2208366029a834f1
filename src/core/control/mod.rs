//! Control channel: structured messages alongside the media session.
//!
//! Carries transcript and session-binding events between the avatar client
//! and the remote media server. The channel runs over any
//! [`ControlSubstrate`]: the negotiated connection's in-band data channel or
//! the independent socket provided by [`WebSocketSubstrate`].

mod base;
mod channel;
pub mod messages;
mod websocket;

pub use base::{
    ChannelError, ChannelResult, ChannelState, ChannelStateCallback, ControlMessageCallback,
    ControlSubstrate, SubstrateEvent,
};
pub use channel::ControlChannel;
pub use messages::{ControlMessage, MessageBody, MessageConsumer};
pub use websocket::WebSocketSubstrate;
