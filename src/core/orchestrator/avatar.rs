//! Composition root of the avatar client.
//!
//! # Example
//!
//! ```rust,ignore
//! use talking_avatar::{AvatarConfig, AvatarOrchestrator};
//! use std::sync::Arc;
//!
//! let avatar = AvatarOrchestrator::streamed(config, host_transports, host_audio)?;
//! avatar.on_transcript(Arc::new(|msg| Box::pin(async move {
//!     println!("{}: {}", msg.sender().unwrap_or("?"), msg.content().unwrap_or(""));
//! })));
//!
//! if avatar.connect().await.is_err() {
//!     // render a retry affordance; avatar.retry().await later
//! }
//!
//! // every animation frame
//! avatar.render_frame(&mut head_mesh);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AvatarConfig, ControlMode};
use crate::core::animation::{BlinkScheduler, MorphTargetAnimator, MorphTargetSink};
use crate::core::audio::{AudioAnalysisDriver, AudioContextFactory, PcmAudioContext, PcmStream};
use crate::core::control::{
    ChannelError, ChannelState, ControlChannel, ControlMessage, ControlMessageCallback,
    ControlSubstrate, MessageConsumer, SubstrateEvent, WebSocketSubstrate,
};
use crate::core::human::HumanInputClient;
use crate::core::media::{MediaKind, MediaStream};
use crate::core::signaling::{SessionError, SessionIdCallback, SessionState, SignalingSession};
use crate::core::transport::TransportFactory;
use crate::errors::{AvatarError, AvatarResult};

// =============================================================================
// Status Types
// =============================================================================

/// Where the avatar's speech comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarMode {
    /// Server-pushed video and audio over a negotiated connection
    Streamed,
    /// Locally played synthesized speech animating a 3D mesh
    Synthesized,
}

impl AvatarMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvatarMode::Streamed => "streamed",
            AvatarMode::Synthesized => "synthesized",
        }
    }
}

impl fmt::Display for AvatarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of the avatar's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaStatus {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Waiting for the remote video track
    Loading,
    Ready,
    /// The remote video track did not arrive in time
    Unavailable,
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaStatus::Idle => write!(f, "idle"),
            MediaStatus::Loading => write!(f, "loading"),
            MediaStatus::Ready => write!(f, "ready"),
            MediaStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Snapshot of everything the surrounding UI renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarStatus {
    pub mode: AvatarMode,
    pub session_state: SessionState,
    pub session_id: Option<String>,
    /// Cause of the last negotiation failure, for the retry affordance
    pub last_error: Option<String>,
    pub media: MediaStatus,
    pub channel_open: bool,
}

/// Callback type for status snapshots.
pub type StatusCallback = Arc<dyn Fn(AvatarStatus) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    transcript: Option<ControlMessageCallback>,
    audio: Option<ControlMessageCallback>,
    session_id: Option<SessionIdCallback>,
    status: Option<StatusCallback>,
}

// =============================================================================
// Shared State
// =============================================================================

/// State reachable from session, channel and timer callbacks. Those hold it
/// weakly so the orchestrator alone decides its lifetime.
struct Shared {
    mode: AvatarMode,
    config: AvatarConfig,
    session: Option<SignalingSession>,
    driver: AudioAnalysisDriver,
    human: HumanInputClient,
    channel: Mutex<Option<Arc<ControlChannel>>>,
    synthesized: Mutex<Option<Arc<PcmStream>>>,
    media: Mutex<MediaStatus>,
    media_watchdog: Mutex<Option<JoinHandle<()>>>,
    callbacks: Mutex<Callbacks>,
    shut_down: AtomicBool,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn status(&self) -> AvatarStatus {
        let (session_state, session_id, last_error) = match &self.session {
            Some(session) => (session.state(), session.session_id(), session.last_error()),
            None => (SessionState::Idle, None, None),
        };
        AvatarStatus {
            mode: self.mode,
            session_state,
            session_id,
            last_error,
            media: *self.media.lock(),
            channel_open: self
                .channel
                .lock()
                .as_ref()
                .is_some_and(|channel| channel.is_open()),
        }
    }

    fn notify_status(&self) {
        if self.is_shut_down() {
            return;
        }
        let callback = self.callbacks.lock().status.clone();
        if let Some(cb) = callback {
            cb(self.status());
        }
    }

    fn set_media(&self, status: MediaStatus) {
        {
            let mut media = self.media.lock();
            if *media == status {
                return;
            }
            *media = status;
        }
        tracing::info!("Avatar media {}", status);
        self.notify_status();
    }

    /// Enter `Loading` and arm the watchdog that reports `Unavailable`.
    fn begin_media_wait(self: &Arc<Self>) {
        if *self.media.lock() == MediaStatus::Ready {
            return;
        }
        self.set_media(MediaStatus::Loading);

        let timeout_ms = self.config.media.media_timeout_ms;
        if timeout_ms == 0 {
            return;
        }
        let weak = Arc::downgrade(self);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let still_loading = *shared.media.lock() == MediaStatus::Loading;
            if still_loading {
                tracing::warn!("No video track after {}ms", timeout_ms);
                shared.set_media(MediaStatus::Unavailable);
            }
        });
        if let Some(previous) = self.media_watchdog.lock().replace(watchdog) {
            previous.abort();
        }
    }

    fn end_media_wait(&self, status: MediaStatus) {
        if let Some(watchdog) = self.media_watchdog.lock().take() {
            watchdog.abort();
        }
        self.set_media(status);
    }

    fn install_channel(
        self: &Arc<Self>,
        substrate: Arc<dyn ControlSubstrate>,
        events: mpsc::Receiver<SubstrateEvent>,
    ) {
        if self.is_shut_down() {
            substrate.close();
            return;
        }

        let channel = ControlChannel::new(substrate);
        let weak = Arc::downgrade(self);
        channel.on_message(Arc::new(move |message| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    shared.route(message).await;
                }
            })
        }));
        let weak = Arc::downgrade(self);
        channel.on_state_change(Arc::new(move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.notify_status();
            }
        }));
        channel.start(events);

        tracing::info!("Control channel {} attached ({})", channel.id(), channel.label());
        let previous = self.channel.lock().replace(channel);
        if let Some(previous) = previous {
            previous.close();
        }
    }

    async fn route(&self, message: ControlMessage) {
        if self.is_shut_down() {
            return;
        }
        match message.consumer() {
            MessageConsumer::Transcript => {
                let callback = self.callbacks.lock().transcript.clone();
                if let Some(cb) = callback {
                    cb(message).await;
                }
            }
            MessageConsumer::Audio => {
                if self.mode == AvatarMode::Synthesized {
                    self.push_synthesized_audio(&message);
                }
                let callback = self.callbacks.lock().audio.clone();
                if let Some(cb) = callback {
                    cb(message).await;
                }
            }
            MessageConsumer::Status => {
                tracing::info!("System message: {}", message.content().unwrap_or_default());
            }
            MessageConsumer::Ignored => {}
        }
    }

    fn push_synthesized_audio(&self, message: &ControlMessage) {
        let Some(content) = message.content() else {
            return;
        };
        let pcm = match BASE64.decode(content.trim()) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!("Dropping audio message with invalid base64: {}", e);
                return;
            }
        };

        let stream = {
            let mut slot = self.synthesized.lock();
            match slot.as_ref() {
                Some(stream) => stream.clone(),
                None => {
                    let stream = PcmStream::new(self.config.media.synthesized_sample_rate);
                    *slot = Some(stream.clone());
                    stream
                }
            }
        };
        if let Err(e) = stream.push_pcm16le(&pcm) {
            tracing::warn!("Dropping audio message: {}", e);
            return;
        }
        if let Err(e) = self
            .driver
            .attach(stream)
            .and_then(|_| self.driver.set_speaking(true))
        {
            tracing::warn!("Synthesized audio not analysed: {}", e);
        }
    }

    fn on_session_id(&self, id: Option<String>) {
        self.human.set_session_id(id.clone());
        if self.is_shut_down() {
            return;
        }
        let callback = self.callbacks.lock().session_id.clone();
        if let Some(cb) = callback {
            cb(id);
        }
        self.notify_status();
    }

    fn wire_session(shared: &Arc<Self>, session: &SignalingSession) {
        let weak: Weak<Self> = Arc::downgrade(shared);
        session.on_session_id(Arc::new(move |id| {
            if let Some(shared) = weak.upgrade() {
                shared.on_session_id(id);
            }
        }));

        let weak = Arc::downgrade(shared);
        session.on_track(Arc::new(move |binding| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match binding.kind {
                MediaKind::Audio => {
                    if let Err(e) = shared.driver.attach(binding.stream) {
                        tracing::warn!("Remote audio not analysed: {}", e);
                    }
                }
                MediaKind::Video => shared.end_media_wait(MediaStatus::Ready),
            }
        }));

        if shared.config.control.mode == ControlMode::DataChannel {
            let weak = Arc::downgrade(shared);
            session.on_data_channel(Arc::new(move |handle| {
                if let Some(shared) = weak.upgrade() {
                    shared.install_channel(handle.substrate, handle.events);
                }
            }));
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the session, control channel, audio analysis and animation of one
/// mounted avatar, and tears all of them down together.
pub struct AvatarOrchestrator {
    shared: Arc<Shared>,
    blink: BlinkScheduler,
    animator: Mutex<MorphTargetAnimator>,
    cancel: CancellationToken,
}

impl AvatarOrchestrator {
    /// Server-streamed avatar. Must be called within a Tokio runtime.
    pub fn streamed(
        config: AvatarConfig,
        transports: Arc<dyn TransportFactory>,
        audio: Arc<dyn AudioContextFactory>,
    ) -> AvatarResult<Self> {
        Self::build(config, AvatarMode::Streamed, Some(transports), audio)
    }

    /// Locally synthesized avatar analysed in-process. Must be called within
    /// a Tokio runtime.
    pub fn synthesized(config: AvatarConfig) -> AvatarResult<Self> {
        Self::build(config, AvatarMode::Synthesized, None, PcmAudioContext::factory())
    }

    fn build(
        config: AvatarConfig,
        mode: AvatarMode,
        transports: Option<Arc<dyn TransportFactory>>,
        audio: Arc<dyn AudioContextFactory>,
    ) -> AvatarResult<Self> {
        config.validate()?;

        let session = transports
            .map(|factory| SignalingSession::new(config.signaling.clone(), factory))
            .transpose()?;
        let human = HumanInputClient::new(
            config.signaling.human_url(),
            Duration::from_millis(config.signaling.answer_timeout_ms),
        );
        let media = match mode {
            AvatarMode::Streamed => MediaStatus::Idle,
            AvatarMode::Synthesized => MediaStatus::Ready,
        };

        let shared = Arc::new(Shared {
            mode,
            driver: AudioAnalysisDriver::new(config.analysis.clone(), audio),
            session,
            human,
            channel: Mutex::new(None),
            synthesized: Mutex::new(None),
            media: Mutex::new(media),
            media_watchdog: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
            shut_down: AtomicBool::new(false),
            config,
        });

        let cancel = CancellationToken::new();
        if let Some(session) = &shared.session {
            Shared::wire_session(&shared, session);
            spawn_state_relay(&shared, session, cancel.clone());
        }

        let blink = BlinkScheduler::new(shared.config.blink.clone());
        blink.start();

        tracing::info!("Avatar orchestrator created in {} mode", mode);
        Ok(Self {
            animator: Mutex::new(MorphTargetAnimator::new(shared.config.animation.clone())),
            shared,
            blink,
            cancel,
        })
    }

    pub fn mode(&self) -> AvatarMode {
        self.shared.mode
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.shared.config
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Register the callback for `llm` and `text` messages.
    pub fn on_transcript(&self, callback: ControlMessageCallback) {
        self.shared.callbacks.lock().transcript = Some(callback);
    }

    /// Register the callback for `audio` messages.
    pub fn on_audio(&self, callback: ControlMessageCallback) {
        self.shared.callbacks.lock().audio = Some(callback);
    }

    pub fn on_session_id(&self, callback: SessionIdCallback) {
        self.shared.callbacks.lock().session_id = Some(callback);
    }

    pub fn on_status(&self, callback: StatusCallback) {
        self.shared.callbacks.lock().status = Some(callback);
    }

    pub fn status(&self) -> AvatarStatus {
        self.shared.status()
    }

    pub fn session(&self) -> Option<&SignalingSession> {
        self.shared.session.as_ref()
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Negotiate the media session and attach the control channel.
    ///
    /// In synthesized mode there is no session to negotiate; only a socket
    /// control channel is opened, if configured.
    pub async fn connect(&self) -> AvatarResult<()> {
        if self.shared.is_shut_down() {
            return Err(AvatarError::ShutDown);
        }
        self.open_socket_channel()?;

        let Some(session) = &self.shared.session else {
            return Ok(());
        };
        self.shared.begin_media_wait();
        let result = session.start().await;
        if result.is_err() && session.state() == SessionState::Failed {
            self.shared.end_media_wait(MediaStatus::Idle);
        }
        self.shared.notify_status();
        result.map_err(AvatarError::from)
    }

    /// Retry after a failed negotiation.
    pub async fn retry(&self) -> AvatarResult<()> {
        let state = self.status().session_state;
        if self.shared.session.is_some() && state != SessionState::Failed {
            return Err(SessionError::InvalidState {
                operation: "retry",
                state,
            }
            .into());
        }
        tracing::info!("Retrying avatar connection");
        self.connect().await
    }

    fn open_socket_channel(&self) -> AvatarResult<()> {
        if self.shared.config.control.mode != ControlMode::WebSocket {
            return Ok(());
        }
        let live = self
            .shared
            .channel
            .lock()
            .as_ref()
            .is_some_and(|channel| channel.state() != ChannelState::Closed);
        if live {
            return Ok(());
        }
        let Some(url) = self.shared.config.control.ws_url.as_deref() else {
            return Err(ChannelError::Substrate("no control socket url configured".to_string()).into());
        };

        let (substrate, events) = WebSocketSubstrate::open(url)?;
        self.shared.install_channel(substrate, events);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Send on the control channel. Fails with `ChannelNotReady` while no
    /// channel is open.
    pub async fn send_control(&self, message: &ControlMessage) -> AvatarResult<()> {
        let channel = self
            .shared
            .channel
            .lock()
            .clone()
            .ok_or(ChannelError::ChannelNotReady)?;
        channel.send(message).await.map_err(AvatarError::from)
    }

    /// Wait for the control channel to open, bounded by the configured
    /// open timeout.
    pub async fn wait_control_open(&self) -> AvatarResult<()> {
        let timeout = Duration::from_millis(self.shared.config.control.open_timeout_ms);
        let channel = self.shared.channel.lock().clone();
        match channel {
            Some(channel) => channel.wait_open(timeout).await.map_err(AvatarError::from),
            None => Err(ChannelError::ChannelNotReady.into()),
        }
    }

    /// Post user text to `/human` under the negotiated session.
    pub async fn send_human_input(&self, text: &str) -> AvatarResult<()> {
        self.shared
            .human
            .send_text(text)
            .await
            .map_err(AvatarError::from)
    }

    // -------------------------------------------------------------------------
    // Audio and animation
    // -------------------------------------------------------------------------

    /// Assert or deassert that the avatar is speaking. Analysis errors are
    /// logged, never raised: the animation loop keeps running at 0 openness.
    pub fn set_speaking(&self, speaking: bool) {
        if let Err(e) = self.shared.driver.set_speaking(speaking) {
            tracing::warn!("Audio analysis unavailable: {}", e);
        }
    }

    /// Start animating from locally played synthesized speech.
    pub fn play_synthesized(&self, stream: Arc<PcmStream>) -> AvatarResult<()> {
        if self.shared.is_shut_down() {
            return Err(AvatarError::ShutDown);
        }
        if self.shared.mode != AvatarMode::Synthesized {
            return Err(AvatarError::Unsupported {
                mode: self.shared.mode.as_str(),
                operation: "play_synthesized",
            });
        }

        let previous = self.shared.synthesized.lock().replace(stream.clone());
        if let Some(previous) = previous
            && !Arc::ptr_eq(&previous, &stream)
        {
            previous.release();
        }
        self.shared.driver.attach(stream)?;
        self.shared.driver.set_speaking(true)?;
        Ok(())
    }

    /// The synthesized utterance finished playing.
    pub fn synthesized_audio_ended(&self) {
        self.set_speaking(false);
        if let Some(stream) = self.shared.synthesized.lock().take() {
            stream.release();
        }
        self.shared.driver.detach();
    }

    /// Advance the facial animation one frame and write it to `sink`.
    /// Returns the openness sampled for this frame.
    pub fn render_frame(&self, sink: &mut dyn MorphTargetSink) -> f32 {
        let openness = self.shared.driver.sample_openness();
        let blinking = self.blink.is_blinking();
        self.animator.lock().frame(sink, openness, blinking);
        openness
    }

    /// The mesh was replaced; drop all morph-target state.
    pub fn reload_mesh(&self, sink: &dyn MorphTargetSink) {
        self.animator.lock().reload(sink);
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_blinking()
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Release everything the avatar owns. Synchronous and idempotent; no
    /// callback fires afterwards.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        self.blink.stop();
        if let Some(watchdog) = self.shared.media_watchdog.lock().take() {
            watchdog.abort();
        }
        if let Some(session) = &self.shared.session {
            session.close();
        }
        let channel = self.shared.channel.lock().take();
        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(stream) = self.shared.synthesized.lock().take() {
            stream.release();
        }
        self.shared.driver.shutdown();
        self.shared.human.set_session_id(None);
        tracing::info!("Avatar orchestrator shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }
}

impl Drop for AvatarOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forward session state transitions to the status observer.
fn spawn_state_relay(shared: &Arc<Shared>, session: &SignalingSession, cancel: CancellationToken) {
    let mut states = session.watch_state();
    let weak = Arc::downgrade(shared);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    shared.notify_status();
                }
            }
        }
    });
}
