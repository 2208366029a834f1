//! Composition of session, control channel, audio analysis and animation.

mod avatar;
mod fault;

pub use avatar::{AvatarMode, AvatarOrchestrator, AvatarStatus, MediaStatus, StatusCallback};
pub use fault::{FaultBoundary, FaultState};
