//! Facial animation: blink timing and morph-target smoothing.

mod blink;
mod morph;

pub use blink::{BlinkCallback, BlinkConfig, BlinkScheduler, BlinkState};
pub use morph::{
    AnimationConfig, BLINK_TARGETS, MOUTH_TARGETS, MorphChannel, MorphTargetAnimator,
    MorphTargetSink, MorphTargetState, select_mesh, smooth_step,
};
