//! Control channel message envelope.
//!
//! Every payload on the control channel is a UTF-8 JSON object tagged by
//! `type`:
//!
//! ```json
//! {"type": "llm", "sender": "ai", "content": "Tell me about yourself."}
//! ```
//!
//! The in-band data channel of older media servers sends the body under
//! `text` instead of `content`; both spellings decode to the same message.

use serde::{Deserialize, Serialize};

use super::base::{ChannelError, ChannelResult};

/// Sender and content shared by every known message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireBody")]
pub struct MessageBody {
    /// Originator of the message (e.g. "user", "ai", "system")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Text content, or base64 audio for `audio` messages
    pub content: String,
}

/// Body as received. `content` wins when both spellings are present.
#[derive(Deserialize)]
struct WireBody {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<WireBody> for MessageBody {
    fn from(wire: WireBody) -> Self {
        Self {
            sender: wire.sender,
            content: wire.content.or(wire.text).unwrap_or_default(),
        }
    }
}

impl MessageBody {
    pub fn new(sender: Option<&str>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.map(str::to_string),
            content: content.into(),
        }
    }
}

/// A structured message exchanged over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Assistant reply produced by the language model
    Llm(MessageBody),

    /// Plain conversational text
    Text(MessageBody),

    /// Synthesized speech, base64 encoded PCM16LE
    Audio(MessageBody),

    /// Session and status notices
    System(MessageBody),

    /// Any `type` this client does not understand
    #[serde(other)]
    Unknown,
}

/// Component that consumes a given message.
///
/// Each known message type is understood by exactly one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageConsumer {
    Transcript,
    Audio,
    Status,
    Ignored,
}

impl ControlMessage {
    pub fn llm(content: impl Into<String>) -> Self {
        ControlMessage::Llm(MessageBody::new(Some("ai"), content))
    }

    pub fn text(sender: &str, content: impl Into<String>) -> Self {
        ControlMessage::Text(MessageBody::new(Some(sender), content))
    }

    pub fn audio(sender: &str, base64_pcm: impl Into<String>) -> Self {
        ControlMessage::Audio(MessageBody::new(Some(sender), base64_pcm))
    }

    pub fn system(content: impl Into<String>) -> Self {
        ControlMessage::System(MessageBody::new(Some("system"), content))
    }

    /// Decode a raw payload received from the substrate.
    pub fn decode(payload: &str) -> ChannelResult<Self> {
        serde_json::from_str(payload).map_err(|e| ChannelError::Decode(e.to_string()))
    }

    /// Encode for sending. `Unknown` carries nothing to send and is rejected.
    pub fn encode(&self) -> ChannelResult<String> {
        if matches!(self, ControlMessage::Unknown) {
            return Err(ChannelError::Serialization(
                "cannot send a message of unknown type".to_string(),
            ));
        }
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }

    /// Wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ControlMessage::Llm(_) => "llm",
            ControlMessage::Text(_) => "text",
            ControlMessage::Audio(_) => "audio",
            ControlMessage::System(_) => "system",
            ControlMessage::Unknown => "unknown",
        }
    }

    pub fn body(&self) -> Option<&MessageBody> {
        match self {
            ControlMessage::Llm(body)
            | ControlMessage::Text(body)
            | ControlMessage::Audio(body)
            | ControlMessage::System(body) => Some(body),
            ControlMessage::Unknown => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.body().map(|b| b.content.as_str())
    }

    pub fn sender(&self) -> Option<&str> {
        self.body().and_then(|b| b.sender.as_deref())
    }

    pub fn consumer(&self) -> MessageConsumer {
        match self {
            ControlMessage::Llm(_) | ControlMessage::Text(_) => MessageConsumer::Transcript,
            ControlMessage::Audio(_) => MessageConsumer::Audio,
            ControlMessage::System(_) => MessageConsumer::Status,
            ControlMessage::Unknown => MessageConsumer::Ignored,
        }
    }
}
