//! Randomized blink pulses.
//!
//! Blinks are discrete on/off edges. Smoothing them into eyelid motion is the
//! morph animator's job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Blink timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// How long the eyes stay closed
    pub pulse_ms: u64,
    /// Shortest start-to-start interval between blinks (inclusive)
    pub min_interval_ms: u64,
    /// Longest start-to-start interval between blinks (exclusive)
    pub max_interval_ms: u64,
    /// Fixed RNG seed for reproducible schedules
    pub seed: Option<u64>,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            pulse_ms: 150,
            min_interval_ms: 3000,
            max_interval_ms: 5000,
            seed: None,
        }
    }
}

/// Called on every blink edge: `true` when the eyes close, `false` when they
/// open again.
pub type BlinkCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkState {
    pub is_blinking: bool,
    pub next_blink_deadline: Option<Instant>,
}

#[derive(Default)]
struct Shared {
    blinking: AtomicBool,
    pulses: AtomicU64,
    next_deadline: Mutex<Option<Instant>>,
    callback: Mutex<Option<BlinkCallback>>,
}

impl Shared {
    fn set_blinking(&self, blinking: bool) {
        if self.blinking.swap(blinking, Ordering::SeqCst) == blinking {
            return;
        }
        if blinking {
            self.pulses.fetch_add(1, Ordering::SeqCst);
        }
        let callback = self.callback.lock().clone();
        if let Some(cb) = callback {
            cb(blinking);
        }
    }
}

/// Emits blink pulses at randomized intervals until stopped.
pub struct BlinkScheduler {
    config: BlinkConfig,
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BlinkScheduler {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            cancel: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn on_blink(&self, callback: BlinkCallback) {
        *self.shared.callback.lock() = Some(callback);
    }

    /// Start the timer. Calling it while running has no effect.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        let shared = self.shared.clone();
        let config = self.config.clone();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        *handle = Some(tokio::spawn(run(config, shared, rng, cancel)));
        tracing::debug!("Blink scheduler started");
    }

    /// Cancel the pending timer. No blink edge fires afterwards.
    pub fn stop(&self) {
        self.cancel.lock().cancel();
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        self.shared.blinking.store(false, Ordering::SeqCst);
        *self.shared.next_deadline.lock() = None;
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_blinking(&self) -> bool {
        self.shared.blinking.load(Ordering::SeqCst)
    }

    /// Blink pulses emitted since creation.
    pub fn pulse_count(&self) -> u64 {
        self.shared.pulses.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BlinkState {
        BlinkState {
            is_blinking: self.is_blinking(),
            next_blink_deadline: *self.shared.next_deadline.lock(),
        }
    }
}

impl Drop for BlinkScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_interval(config: &BlinkConfig, rng: &mut StdRng) -> Duration {
    let ms = if config.max_interval_ms > config.min_interval_ms {
        rng.gen_range(config.min_interval_ms..config.max_interval_ms)
    } else {
        config.min_interval_ms
    };
    Duration::from_millis(ms)
}

async fn run(config: BlinkConfig, shared: Arc<Shared>, mut rng: StdRng, cancel: CancellationToken) {
    let pulse = Duration::from_millis(config.pulse_ms);
    // Deadlines accumulate so intervals are measured start to start.
    let mut deadline = Instant::now() + next_interval(&config, &mut rng);

    loop {
        *shared.next_deadline.lock() = Some(deadline);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(deadline) => {}
        }
        shared.set_blinking(true);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(deadline + pulse) => {}
        }
        shared.set_blinking(false);

        deadline += next_interval(&config, &mut rng);
    }

    shared.blinking.store(false, Ordering::SeqCst);
    tracing::debug!("Blink scheduler stopped");
}
