//! Signaling session configuration.

use serde::{Deserialize, Serialize};

/// Default media server base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8010";

/// Default avatar rendered by the media server.
pub const DEFAULT_AVATAR_ID: &str = "ai_model";

/// Label of the in-band data channel.
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "chat";

/// Configuration for negotiating with the media server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Base URL of the media server; `/offer` and `/human` are resolved against it
    pub server_url: String,

    /// Avatar the server should render
    pub avatar_id: String,

    /// Upper bound for ICE candidate gathering (milliseconds)
    pub ice_gathering_timeout_ms: u64,

    /// Upper bound for the offer POST and its answer (milliseconds)
    pub answer_timeout_ms: u64,

    /// Open an in-band data channel for control messages
    pub open_data_channel: bool,

    /// Label of the in-band data channel
    pub data_channel_label: String,

    /// Sink the remote video track is attached to
    pub video_sink_id: String,

    /// Sink the remote audio track is attached to
    pub audio_sink_id: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            avatar_id: DEFAULT_AVATAR_ID.to_string(),
            ice_gathering_timeout_ms: 10_000,
            answer_timeout_ms: 15_000,
            open_data_channel: true,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            video_sink_id: "avatar-video".to_string(),
            audio_sink_id: "avatar-audio".to_string(),
        }
    }
}

impl SignalingConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Negotiation endpoint.
    pub fn offer_url(&self) -> String {
        self.endpoint("offer")
    }

    /// Human input endpoint.
    pub fn human_url(&self) -> String {
        self.endpoint("human")
    }
}
