//! Per-frame cost of the avatar animation path.
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use talking_avatar::core::animation::{MorphTargetAnimator, MorphTargetSink};
use talking_avatar::core::audio::{
    AnalysisConfig, AudioAnalysisDriver, FrequencyAnalyzer, PcmAudioContext, PcmBuffer,
    PcmFrequencyAnalyzer, PcmStream, openness_from_bins,
};
use talking_avatar::core::control::ControlMessage;

struct BenchMesh {
    targets: Vec<&'static str>,
    influences: Vec<f32>,
}

impl BenchMesh {
    fn head() -> Self {
        let targets = vec![
            "browInnerUp",
            "jawOpen",
            "mouthOpen",
            "viseme_aa",
            "viseme_O",
            "eyeBlinkLeft",
            "eyeBlinkRight",
        ];
        let influences = vec![0.0; targets.len()];
        Self { targets, influences }
    }
}

impl MorphTargetSink for BenchMesh {
    fn mesh_name(&self) -> &str {
        "Wolf3D_Head"
    }

    fn morph_target_index(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| *t == name)
    }

    fn has_morph_targets(&self) -> bool {
        true
    }

    fn influence(&self, index: usize) -> f32 {
        self.influences[index]
    }

    fn set_influence(&mut self, index: usize, value: f32) {
        self.influences[index] = value;
    }
}

fn tone(sample_rate: u32, samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|n| (2.0 * std::f32::consts::PI * 440.0 * n as f32 / sample_rate as f32).sin() * 0.5)
        .collect()
}

/// Benchmark spectrum extraction at the sizes the analyzer accepts in practice
fn bench_pcm_analyzer(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_analyzer");
    group.measurement_time(Duration::from_secs(5));

    for fft_size in [256usize, 1024, 2048] {
        let buffer = Arc::new(PcmBuffer::new(24_000, fft_size * 2));
        buffer.push_samples(&tone(24_000, fft_size * 2));
        let analyzer = PcmFrequencyAnalyzer::new(buffer, fft_size, 0.8).unwrap();
        let mut bins = vec![0u8; fft_size / 2];

        group.bench_with_input(BenchmarkId::new("byte_frequency_data", fft_size), &fft_size, |b, _| {
            b.iter(|| {
                analyzer.byte_frequency_data(black_box(&mut bins));
            });
        });
    }

    group.finish();
}

/// Benchmark the full openness sample taken once per rendered frame
fn bench_sample_openness(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let stream = PcmStream::new(24_000);
    stream.buffer().push_samples(&tone(24_000, 4_800));
    let driver = AudioAnalysisDriver::new(AnalysisConfig::default(), PcmAudioContext::factory());
    driver.attach(stream).unwrap();
    driver.set_speaking(true).unwrap();

    c.bench_function("sample_openness", |b| {
        b.iter(|| black_box(driver.sample_openness()));
    });

    let bins: Vec<u8> = (0..128).map(|i| (i * 2) as u8).collect();
    let config = AnalysisConfig::default();
    c.bench_function("openness_from_bins", |b| {
        b.iter(|| black_box(openness_from_bins(black_box(&bins), &config)));
    });
}

/// Benchmark one animator frame on a typical head mesh
fn bench_animator_frame(c: &mut Criterion) {
    let mut mesh = BenchMesh::head();
    let mut animator = MorphTargetAnimator::default();
    let mut frame = 0u32;

    c.bench_function("animator_frame", |b| {
        b.iter(|| {
            frame = frame.wrapping_add(1);
            let openness = (frame % 60) as f32 / 60.0;
            animator.frame(&mut mesh, black_box(openness), frame % 240 < 9);
        });
    });
}

/// Benchmark control message decoding for the hottest message types
fn bench_control_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("control_decode");

    let llm = r#"{"type":"llm","sender":"ai","content":"Hello, I am the avatar. How can I help you today?"}"#;
    let audio = format!(
        r#"{{"type":"audio","sender":"ai","content":"{}"}}"#,
        "AAAA".repeat(2_400)
    );

    group.bench_function("llm", |b| {
        b.iter(|| ControlMessage::decode(black_box(llm)));
    });
    group.bench_function("audio_100ms", |b| {
        b.iter(|| ControlMessage::decode(black_box(&audio)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pcm_analyzer,
    bench_sample_openness,
    bench_animator_frame,
    bench_control_decode,
);
criterion_main!(benches);
