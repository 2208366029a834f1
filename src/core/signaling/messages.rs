//! Negotiation endpoint payloads.
//!
//! `POST /offer` carries the local description and the avatar to render; the
//! response carries the remote description together with the session
//! identifier minted by the media server.

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::transport::{SdpType, SessionDescription};

/// Request body for the negotiation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(rename = "avatarId")]
    pub avatar_id: String,
}

impl OfferRequest {
    pub fn new(offer: &SessionDescription, avatar_id: &str) -> Self {
        Self {
            sdp: offer.sdp.clone(),
            sdp_type: SdpType::Offer,
            avatar_id: avatar_id.to_string(),
        }
    }
}

/// Response body of the negotiation endpoint.
///
/// Older media servers spell the identifier `sessionid` and may send it as a
/// number; both are accepted, and `sessionId` wins when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireAnswer")]
pub struct AnswerResponse {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

#[derive(Deserialize)]
struct WireAnswer {
    #[serde(rename = "sessionId", default, deserialize_with = "string_or_number")]
    session_id: Option<String>,
    #[serde(rename = "sessionid", default, deserialize_with = "string_or_number")]
    legacy_session_id: Option<String>,
    sdp: String,
    #[serde(rename = "type")]
    sdp_type: SdpType,
}

impl From<WireAnswer> for AnswerResponse {
    fn from(wire: WireAnswer) -> Self {
        Self {
            session_id: wire.session_id.or(wire.legacy_session_id),
            sdp: wire.sdp,
            sdp_type: wire.sdp_type,
        }
    }
}

impl AnswerResponse {
    pub fn description(&self) -> SessionDescription {
        SessionDescription {
            sdp: self.sdp.clone(),
            sdp_type: self.sdp_type,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}
