use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::audio::PcmBuffer;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live media stream owned by the host runtime.
///
/// Implementations wrap whatever the host uses for a remote or locally
/// produced stream. `release` stops delivery and frees host resources; it
/// must be safe to call more than once.
pub trait MediaStream: Send + Sync {
    /// Host identifier of the stream.
    fn id(&self) -> &str;

    /// Whether the stream is still producing media.
    fn is_active(&self) -> bool;

    /// Stop the stream and release its resources.
    fn release(&self);

    /// Decoded PCM backing the stream, for streams produced in-process.
    /// Host streams analysed by the host's own audio graph return `None`.
    fn pcm_source(&self) -> Option<Arc<PcmBuffer>> {
        None
    }
}

/// Shared handle to a host media stream.
pub type SharedMediaStream = Arc<dyn MediaStream>;

/// A track delivered by the remote peer, bound to the surface that renders it.
#[derive(Clone)]
pub struct MediaTrackBinding {
    pub kind: MediaKind,
    pub stream: SharedMediaStream,
    pub attached_sink_id: String,
}

impl MediaTrackBinding {
    pub fn new(kind: MediaKind, stream: SharedMediaStream, attached_sink_id: impl Into<String>) -> Self {
        Self {
            kind,
            stream,
            attached_sink_id: attached_sink_id.into(),
        }
    }
}

impl fmt::Debug for MediaTrackBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrackBinding")
            .field("kind", &self.kind)
            .field("stream", &self.stream.id())
            .field("attached_sink_id", &self.attached_sink_id)
            .finish()
    }
}

/// Callback type for newly bound tracks.
///
/// Invoked synchronously from the transport's track event, after the binding
/// has been installed.
pub type TrackCallback = Arc<dyn Fn(MediaTrackBinding) + Send + Sync>;

/// Active track bindings of a session, at most one per kind.
#[derive(Default)]
pub struct TrackBindings {
    video: Option<MediaTrackBinding>,
    audio: Option<MediaTrackBinding>,
}

impl TrackBindings {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: MediaKind) -> &mut Option<MediaTrackBinding> {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }

    /// Install a binding, releasing the stream of the binding it replaces.
    ///
    /// Re-binding the very same stream is not a replacement and releases
    /// nothing.
    pub fn bind(&mut self, binding: MediaTrackBinding) {
        let kind = binding.kind;
        let incoming = binding.stream.clone();
        if let Some(previous) = self.slot(kind).replace(binding)
            && !Arc::ptr_eq(&previous.stream, &incoming)
        {
            tracing::debug!(
                "Replacing {} binding, releasing stream {}",
                kind,
                previous.stream.id()
            );
            previous.stream.release();
        }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&MediaTrackBinding> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.video.is_some() as usize + self.audio.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every bound stream and clear all bindings.
    pub fn release_all(&mut self) {
        for binding in [self.video.take(), self.audio.take()].into_iter().flatten() {
            binding.stream.release();
        }
    }
}

impl Drop for TrackBindings {
    fn drop(&mut self) {
        self.release_all();
    }
}
