//! Openness computation from a spectrum snapshot.

use serde::{Deserialize, Serialize};

/// Analyzer window used when nothing else is configured.
pub const DEFAULT_FFT_SIZE: usize = 256;

/// Parameters of the openness computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyzer window size in samples; `fft_size / 2` bins
    pub fft_size: usize,

    /// Multiplier applied to the normalised mean magnitude
    pub sensitivity: f32,

    /// Mean magnitudes (0..=255) at or below this are silence
    pub noise_floor: f32,

    /// Smallest openness reported above the noise floor
    pub min_openness: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            sensitivity: 5.0,
            noise_floor: 5.0,
            min_openness: 0.1,
        }
    }
}

/// Mean of a byte spectrum snapshot. Empty snapshots are silent.
pub fn mean_magnitude(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / bins.len() as f32
}

/// Map a mean magnitude onto `[0, 1]`.
///
/// At or below the noise floor the result is exactly 0. Above it, the
/// normalised and scaled magnitude is capped at 1 and raised to at least
/// `min_openness`. The result is non-decreasing in `mean` for any
/// non-negative sensitivity.
pub fn openness_from_mean(mean: f32, config: &AnalysisConfig) -> f32 {
    if !mean.is_finite() || mean <= config.noise_floor {
        return 0.0;
    }
    let sensitivity = config.sensitivity.max(0.0);
    let scaled = (mean / 255.0 * sensitivity).min(1.0);
    scaled.max(config.min_openness).clamp(0.0, 1.0)
}

/// Openness of a byte spectrum snapshot.
pub fn openness_from_bins(bins: &[u8], config: &AnalysisConfig) -> f32 {
    openness_from_mean(mean_magnitude(bins), config)
}
