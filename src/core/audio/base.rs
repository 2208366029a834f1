//! Audio graph capabilities.
//!
//! The host owns the audio graph. The analysis driver only needs three
//! things from it: a context it can create lazily and close on teardown, the
//! ability to tap a stream with a frequency analyzer, and a byte snapshot of
//! that analyzer's spectrum.

use std::sync::Arc;

use thiserror::Error;

use crate::core::media::SharedMediaStream;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum AudioError {
    /// The host could not provide an audio context
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// The stream cannot be analysed by this context
    #[error("Unsupported stream: {0}")]
    UnsupportedStream(String),

    /// Invalid analyzer parameters or sample data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The context was closed
    #[error("Audio context closed")]
    Closed,
}

pub type AudioResult<T> = Result<T, AudioError>;

// =============================================================================
// Capabilities
// =============================================================================

/// Frequency analyzer attached to one stream.
pub trait FrequencyAnalyzer: Send + Sync {
    /// Analysis window size in samples.
    fn fft_size(&self) -> usize;

    /// Number of bins in a snapshot.
    fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    /// Fill `bins` with the current magnitude per bin, `0..=255`.
    ///
    /// Writes at most `frequency_bin_count()` values; extra entries are left
    /// untouched.
    fn byte_frequency_data(&self, bins: &mut [u8]);

    /// Detach the analyzer from its stream. Idempotent.
    fn disconnect(&self);
}

/// Host audio graph.
pub trait AudioContext: Send + Sync {
    /// Route `stream` through a new frequency analyzer.
    fn create_analyzer(
        &self,
        stream: &SharedMediaStream,
        fft_size: usize,
    ) -> AudioResult<Arc<dyn FrequencyAnalyzer>>;

    /// Close the context and every analyzer created from it. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Creates the audio context on first need.
pub trait AudioContextFactory: Send + Sync {
    fn create(&self) -> AudioResult<Arc<dyn AudioContext>>;
}

impl<F> AudioContextFactory for F
where
    F: Fn() -> AudioResult<Arc<dyn AudioContext>> + Send + Sync,
{
    fn create(&self) -> AudioResult<Arc<dyn AudioContext>> {
        self()
    }
}
