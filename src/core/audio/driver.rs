//! Per-frame openness sampling over a tapped audio stream.

use std::sync::Arc;

use parking_lot::Mutex;

use super::analysis::{AnalysisConfig, openness_from_bins};
use super::base::{AudioContext, AudioContextFactory, AudioResult, FrequencyAnalyzer};
use crate::core::media::SharedMediaStream;

struct Tap {
    stream: SharedMediaStream,
    analyzer: Arc<dyn FrequencyAnalyzer>,
}

#[derive(Default)]
struct DriverState {
    /// Lazily created, closed on shutdown
    context: Option<Arc<dyn AudioContext>>,
    /// Stream registered for analysis, tapped only while speaking
    source: Option<SharedMediaStream>,
    tap: Option<Tap>,
    speaking: bool,
    bins: Vec<u8>,
}

/// Turns a live audio stream into a per-frame openness value.
///
/// At most one tap exists at a time. Switching streams always releases the
/// old tap before attaching the new one.
pub struct AudioAnalysisDriver {
    config: AnalysisConfig,
    factory: Arc<dyn AudioContextFactory>,
    state: Mutex<DriverState>,
}

impl AudioAnalysisDriver {
    pub fn new(config: AnalysisConfig, factory: Arc<dyn AudioContextFactory>) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(DriverState::default()),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Register the stream that drives animation, replacing any previous one.
    /// It is tapped immediately if speaking is asserted.
    pub fn attach(&self, stream: SharedMediaStream) -> AudioResult<()> {
        let mut state = self.state.lock();
        state.source = Some(stream);
        if state.speaking {
            self.retap(&mut state)?;
        }
        Ok(())
    }

    /// Forget the registered stream and release its tap.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.source = None;
        Self::release_tap(&mut state);
    }

    /// Assert or deassert speaking. Deasserting releases the tap, so the next
    /// sample is 0.
    pub fn set_speaking(&self, speaking: bool) -> AudioResult<()> {
        let mut state = self.state.lock();
        state.speaking = speaking;
        if speaking {
            self.retap(&mut state)
        } else {
            Self::release_tap(&mut state);
            Ok(())
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }

    pub fn is_tapped(&self) -> bool {
        self.state.lock().tap.is_some()
    }

    pub fn has_context(&self) -> bool {
        self.state.lock().context.is_some()
    }

    /// Current openness in `[0, 1]`. Never fails: no tap means 0.
    pub fn sample_openness(&self) -> f32 {
        let mut state = self.state.lock();
        if !state.speaking {
            return 0.0;
        }
        let analyzer = match &state.tap {
            Some(tap) => tap.analyzer.clone(),
            None => return 0.0,
        };

        let bin_count = analyzer.frequency_bin_count();
        state.bins.clear();
        state.bins.resize(bin_count, 0);
        analyzer.byte_frequency_data(&mut state.bins);
        openness_from_bins(&state.bins, &self.config)
    }

    /// Release the tap and close the audio context.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        Self::release_tap(&mut state);
        state.source = None;
        state.speaking = false;
        if let Some(context) = state.context.take() {
            context.close();
            tracing::debug!("Audio context closed");
        }
    }

    fn retap(&self, state: &mut DriverState) -> AudioResult<()> {
        let Some(source) = state.source.clone() else {
            return Ok(());
        };
        if let Some(tap) = &state.tap
            && Arc::ptr_eq(&tap.stream, &source)
        {
            return Ok(());
        }
        // The old tap goes even when the new stream cannot be tapped.
        Self::release_tap(state);
        if !source.is_active() {
            tracing::debug!("Stream {} is no longer active, not tapping", source.id());
            return Ok(());
        }

        let context = match &state.context {
            Some(context) if !context.is_closed() => context.clone(),
            _ => {
                let context = self.factory.create()?;
                tracing::debug!("Audio context created");
                state.context = Some(context.clone());
                context
            }
        };
        let analyzer = context.create_analyzer(&source, self.config.fft_size)?;
        tracing::debug!("Tapped stream {} for analysis", source.id());
        state.tap = Some(Tap {
            stream: source,
            analyzer,
        });
        Ok(())
    }

    fn release_tap(state: &mut DriverState) {
        if let Some(tap) = state.tap.take() {
            tap.analyzer.disconnect();
            tracing::debug!("Released analysis tap on {}", tap.stream.id());
        }
    }
}

impl Drop for AudioAnalysisDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
