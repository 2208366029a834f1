//! Media stream handles and track bindings.
//!
//! A remote peer adds one video and one audio track per session. Each track is
//! bound to a rendering surface (its sink) through a [`MediaTrackBinding`].
//! [`TrackBindings`] keeps at most one active binding per [`MediaKind`] and
//! releases the replaced stream whenever a later track of the same kind
//! arrives.

mod binding;

pub use binding::{
    MediaKind, MediaStream, MediaTrackBinding, SharedMediaStream, TrackBindings, TrackCallback,
};
