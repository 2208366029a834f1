//! Audio analysis: live stream to per-frame mouth openness.

mod analysis;
mod base;
mod driver;
pub mod pcm;

pub use analysis::{
    AnalysisConfig, DEFAULT_FFT_SIZE, mean_magnitude, openness_from_bins, openness_from_mean,
};
pub use base::{AudioContext, AudioContextFactory, AudioError, AudioResult, FrequencyAnalyzer};
pub use driver::AudioAnalysisDriver;
pub use pcm::{PcmAudioContext, PcmBuffer, PcmFrequencyAnalyzer, PcmStream};
