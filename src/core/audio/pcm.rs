//! In-process audio graph for locally synthesized speech.
//!
//! Synthesized audio arrives as PCM16LE frames. They are pushed into a
//! [`PcmStream`] as they are played, and [`PcmAudioContext`] analyses the most
//! recent window the same way a browser analyser node does: Blackman window,
//! FFT, temporal smoothing, then decibels mapped onto `0..=255`.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use uuid::Uuid;

use super::base::{
    AudioContext, AudioContextFactory, AudioError, AudioResult, FrequencyAnalyzer,
};
use crate::core::media::{MediaStream, SharedMediaStream};

/// Temporal smoothing between successive snapshots.
pub const DEFAULT_SMOOTHING: f32 = 0.8;
/// Decibel level mapped to 0.
pub const MIN_DECIBELS: f32 = -100.0;
/// Decibel level mapped to 255.
pub const MAX_DECIBELS: f32 = -30.0;

/// Largest analysis window a context accepts.
pub const MAX_FFT_SIZE: usize = 32768;
const MIN_FFT_SIZE: usize = 32;

/// Bounded history of decoded samples, newest last.
pub struct PcmBuffer {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_samples(&self, input: &[f32]) {
        let mut samples = self.samples.lock();
        let skip = input.len().saturating_sub(self.capacity);
        for &sample in &input[skip..] {
            if samples.len() == self.capacity {
                samples.pop_front();
            }
            samples.push_back(sample);
        }
    }

    /// Push little-endian signed 16-bit samples. Returns the sample count.
    pub fn push_pcm16le(&self, bytes: &[u8]) -> AudioResult<usize> {
        if bytes.len() % 2 != 0 {
            return Err(AudioError::InvalidInput(format!(
                "PCM16 frame has odd length {}",
                bytes.len()
            )));
        }
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();
        self.push_samples(&samples);
        Ok(samples.len())
    }

    /// Copy the newest `out.len()` samples into `out`, right-aligned and
    /// zero-padded when fewer are buffered.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let samples = self.samples.lock();
        let available = samples.len().min(out.len());
        let pad = out.len() - available;
        out[..pad].fill(0.0);
        let start = samples.len() - available;
        for (slot, sample) in out[pad..].iter_mut().zip(samples.range(start..)) {
            *slot = *sample;
        }
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

/// Locally produced audio stream backed by a [`PcmBuffer`].
pub struct PcmStream {
    id: String,
    buffer: Arc<PcmBuffer>,
    active: AtomicBool,
}

impl PcmStream {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            id: format!("pcm-{}", Uuid::new_v4()),
            buffer: Arc::new(PcmBuffer::new(sample_rate, MAX_FFT_SIZE)),
            active: AtomicBool::new(true),
        })
    }

    pub fn buffer(&self) -> &Arc<PcmBuffer> {
        &self.buffer
    }

    /// Feed a PCM16LE frame as it is played. Ignored once released.
    pub fn push_pcm16le(&self, bytes: &[u8]) -> AudioResult<usize> {
        if !self.is_active() {
            return Ok(0);
        }
        self.buffer.push_pcm16le(bytes)
    }
}

impl MediaStream for PcmStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn release(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.buffer.clear();
        }
    }

    fn pcm_source(&self) -> Option<Arc<PcmBuffer>> {
        Some(self.buffer.clone())
    }
}

struct AnalyzerWork {
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

/// Analyser over a [`PcmBuffer`].
pub struct PcmFrequencyAnalyzer {
    source: Mutex<Option<Arc<PcmBuffer>>>,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    smoothing: f32,
    work: Mutex<AnalyzerWork>,
}

impl PcmFrequencyAnalyzer {
    pub fn new(source: Arc<PcmBuffer>, fft_size: usize, smoothing: f32) -> AudioResult<Self> {
        validate_fft_size(fft_size)?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Ok(Self {
            source: Mutex::new(Some(source)),
            fft,
            fft_size,
            window: blackman_window(fft_size),
            smoothing: smoothing.clamp(0.0, 1.0),
            work: Mutex::new(AnalyzerWork {
                frame: vec![0.0; fft_size],
                spectrum: vec![Complex::new(0.0, 0.0); fft_size],
                scratch: vec![Complex::new(0.0, 0.0); scratch_len],
                smoothed: vec![0.0; fft_size / 2],
            }),
        })
    }

    fn is_connected(&self) -> bool {
        self.source.lock().is_some()
    }
}

impl FrequencyAnalyzer for PcmFrequencyAnalyzer {
    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_frequency_data(&self, bins: &mut [u8]) {
        let count = bins.len().min(self.frequency_bin_count());
        let Some(source) = self.source.lock().clone() else {
            bins[..count].fill(0);
            return;
        };

        let mut work = self.work.lock();
        let AnalyzerWork {
            frame,
            spectrum,
            scratch,
            smoothed,
        } = &mut *work;

        source.copy_latest(frame);
        for ((slot, sample), weight) in spectrum.iter_mut().zip(frame.iter()).zip(&self.window) {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process_with_scratch(spectrum, scratch);

        let scale = 1.0 / self.fft_size as f32;
        for (k, level) in smoothed.iter_mut().enumerate() {
            let magnitude = spectrum[k].norm() * scale;
            *level = self.smoothing * *level + (1.0 - self.smoothing) * magnitude;
        }

        for (out, level) in bins[..count].iter_mut().zip(smoothed.iter()) {
            *out = decibels_to_byte(*level);
        }
    }

    fn disconnect(&self) {
        self.source.lock().take();
    }
}

fn decibels_to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let normalized = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    (normalized * 255.0).clamp(0.0, 255.0) as u8
}

fn blackman_window(size: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

fn validate_fft_size(fft_size: usize) -> AudioResult<()> {
    if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        return Err(AudioError::InvalidInput(format!(
            "fft_size must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}, got {fft_size}"
        )));
    }
    Ok(())
}

/// Audio context analysing [`PcmStream`]s in-process.
pub struct PcmAudioContext {
    smoothing: f32,
    analyzers: Mutex<Vec<Arc<PcmFrequencyAnalyzer>>>,
    closed: AtomicBool,
}

impl PcmAudioContext {
    pub fn new() -> Self {
        Self::with_smoothing(DEFAULT_SMOOTHING)
    }

    pub fn with_smoothing(smoothing: f32) -> Self {
        Self {
            smoothing,
            analyzers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Factory producing a fresh context on each call.
    pub fn factory() -> Arc<dyn AudioContextFactory> {
        Arc::new(|| -> AudioResult<Arc<dyn AudioContext>> { Ok(Arc::new(PcmAudioContext::new())) })
    }
}

impl Default for PcmAudioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioContext for PcmAudioContext {
    fn create_analyzer(
        &self,
        stream: &SharedMediaStream,
        fft_size: usize,
    ) -> AudioResult<Arc<dyn FrequencyAnalyzer>> {
        if self.is_closed() {
            return Err(AudioError::Closed);
        }
        let source = stream.pcm_source().ok_or_else(|| {
            AudioError::UnsupportedStream(format!("{} carries no in-process PCM", stream.id()))
        })?;

        let analyzer = Arc::new(PcmFrequencyAnalyzer::new(source, fft_size, self.smoothing)?);
        let mut analyzers = self.analyzers.lock();
        analyzers.retain(|a| a.is_connected());
        analyzers.push(analyzer.clone());
        Ok(analyzer)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for analyzer in self.analyzers.lock().drain(..) {
            analyzer.disconnect();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
