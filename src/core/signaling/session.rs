//! Signaling session: offer/answer negotiation with the media server.
//!
//! # Example
//!
//! ```rust,ignore
//! use talking_avatar::core::signaling::{SignalingConfig, SignalingSession};
//! use std::sync::Arc;
//!
//! let session = SignalingSession::new(SignalingConfig::default(), host_transport_factory)?;
//! session.on_session_id(Arc::new(|id| println!("session id: {id:?}")));
//! session.on_track(Arc::new(|binding| println!("{} track bound", binding.kind)));
//!
//! if let Err(e) = session.start().await {
//!     // Failed: render a retry affordance, then call start() again
//! }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::base::{
    DataChannelCallback, SessionError, SessionIdCallback, SessionResult,
};
use super::config::SignalingConfig;
use super::messages::{AnswerResponse, OfferRequest};
use super::state::SessionState;
use crate::core::media::{MediaKind, MediaTrackBinding, TrackBindings, TrackCallback};
use crate::core::transport::{
    IceGatheringState, PeerTransport, SdpType, SessionDescription, TransportFactory,
};

/// How a negotiation attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Established,
    /// Torn down while in flight
    Closed,
}

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    /// Opaque identifier from the media server, empty until negotiated
    id: String,
    local_offer: Option<SessionDescription>,
    remote_answer: Option<SessionDescription>,
    ice_gathering_complete: bool,
    last_error: Option<String>,
    transport: Option<Arc<dyn PeerTransport>>,
    bindings: TrackBindings,
    /// Incremented by every start(); stale attempts compare against it
    attempt: u64,
    /// Cancelled by close() to resume any in-flight suspension
    cancel: Option<CancellationToken>,
}

impl SessionInner {
    /// Whether `attempt` is no longer the live negotiation.
    fn superseded(&self, attempt: u64) -> bool {
        self.attempt != attempt || self.state == SessionState::Closed
    }
}

/// Negotiates and owns the real-time media connection with the media server.
///
/// One negotiation runs at a time: `start()` while another is in flight is
/// rejected with [`SessionError::AlreadyActive`].
pub struct SignalingSession {
    config: SignalingConfig,
    http: reqwest::Client,
    factory: Arc<dyn TransportFactory>,
    inner: Arc<Mutex<SessionInner>>,
    state_tx: watch::Sender<SessionState>,
    session_id_callback: Arc<Mutex<Option<SessionIdCallback>>>,
    track_callback: Arc<Mutex<Option<TrackCallback>>>,
    data_channel_callback: Arc<Mutex<Option<DataChannelCallback>>>,
}

impl SignalingSession {
    pub fn new(
        config: SignalingConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.answer_timeout_ms))
            .build()
            .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::with_client(config, factory, http))
    }

    /// Build with a caller-provided HTTP client.
    pub fn with_client(
        config: SignalingConfig,
        factory: Arc<dyn TransportFactory>,
        http: reqwest::Client,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            http,
            factory,
            inner: Arc::new(Mutex::new(SessionInner::default())),
            state_tx,
            session_id_callback: Arc::new(Mutex::new(None)),
            track_callback: Arc::new(Mutex::new(None)),
            data_channel_callback: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Register the callback that receives the session identifier when it is
    /// minted, and `None` when it becomes invalid.
    pub fn on_session_id(&self, callback: SessionIdCallback) {
        *self.session_id_callback.lock() = Some(callback);
    }

    /// Register the callback for bound remote tracks.
    pub fn on_track(&self, callback: TrackCallback) {
        *self.track_callback.lock() = Some(callback);
    }

    /// Register the callback that receives the in-band data channel.
    pub fn on_data_channel(&self, callback: DataChannelCallback) {
        *self.data_channel_callback.lock() = Some(callback);
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Session identifier, `None` until negotiation succeeded.
    pub fn session_id(&self) -> Option<String> {
        let inner = self.inner.lock();
        (!inner.id.is_empty()).then(|| inner.id.clone())
    }

    /// Human-readable cause of the last failure.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn local_offer(&self) -> Option<SessionDescription> {
        self.inner.lock().local_offer.clone()
    }

    pub fn remote_answer(&self) -> Option<SessionDescription> {
        self.inner.lock().remote_answer.clone()
    }

    pub fn ice_gathering_complete(&self) -> bool {
        self.inner.lock().ice_gathering_complete
    }

    pub fn binding(&self, kind: MediaKind) -> Option<MediaTrackBinding> {
        self.inner.lock().bindings.get(kind).cloned()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Negotiate a connection.
    ///
    /// Valid from `Idle` and `Failed`. Resolves `Ok(())` once `Established`,
    /// and also when [`SignalingSession::close`] tore the negotiation down
    /// while it was in flight. Any network or protocol error leaves the
    /// session `Failed` with a human-readable cause; there is no automatic
    /// retry.
    pub async fn start(&self) -> SessionResult<()> {
        let (attempt, cancel) = {
            let mut inner = self.inner.lock();
            if inner.state.is_negotiating() {
                return Err(SessionError::AlreadyActive);
            }
            if !inner.state.can_start() {
                return Err(SessionError::InvalidState {
                    operation: "start",
                    state: inner.state,
                });
            }

            inner.attempt += 1;
            inner.id.clear();
            inner.local_offer = None;
            inner.remote_answer = None;
            inner.ice_gathering_complete = false;
            inner.last_error = None;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            inner.state = SessionState::Negotiating;
            (inner.attempt, cancel)
        };
        self.publish_state(SessionState::Negotiating);
        tracing::info!("Starting negotiation with {}", self.config.offer_url());

        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(Outcome::Closed),
            result = self.negotiate(attempt) => result,
        };

        match result {
            Ok(Outcome::Established) => Ok(()),
            Ok(Outcome::Closed) => {
                // The transport may have closed underneath us without close().
                if self.shut_down(Some(attempt)) {
                    tracing::info!("Transport closed during negotiation, session closed");
                } else {
                    tracing::info!("Negotiation abandoned, session closed");
                }
                Ok(())
            }
            Err(e) => {
                self.fail(attempt, &e);
                Err(e)
            }
        }
    }

    async fn negotiate(&self, attempt: u64) -> SessionResult<Outcome> {
        let transport = self
            .factory
            .create()
            .map_err(|e| SessionError::NegotiationFailed(e.to_string()))?;
        {
            let mut inner = self.inner.lock();
            if inner.superseded(attempt) {
                transport.close();
                return Ok(Outcome::Closed);
            }
            inner.transport = Some(transport.clone());
        }

        self.register_track_handler(transport.as_ref(), attempt);
        if self.config.open_data_channel {
            let handle = transport.create_data_channel(&self.config.data_channel_label)?;
            let callback = self.data_channel_callback.lock().clone();
            match callback {
                Some(cb) => cb(handle),
                None => tracing::debug!("No data channel consumer registered"),
            }
        }
        transport.add_recv_only_transceiver(MediaKind::Video)?;
        transport.add_recv_only_transceiver(MediaKind::Audio)?;

        let offer = transport.create_offer().await?;
        if self.torn_down(attempt, transport.as_ref()) {
            return Ok(Outcome::Closed);
        }
        transport.set_local_description(offer).await?;
        if !self.advance(attempt, transport.as_ref(), SessionState::GatheringIce) {
            return Ok(Outcome::Closed);
        }

        if !self.wait_ice_gathering(attempt, transport.as_ref()).await? {
            return Ok(Outcome::Closed);
        }

        let local = transport.local_description().ok_or_else(|| {
            SessionError::NegotiationFailed("no local description after ICE gathering".to_string())
        })?;
        {
            let mut inner = self.inner.lock();
            inner.ice_gathering_complete = true;
            inner.local_offer = Some(local.clone());
        }
        if !self.advance(attempt, transport.as_ref(), SessionState::AwaitingRemoteAnswer) {
            return Ok(Outcome::Closed);
        }

        let timeout = Duration::from_millis(self.config.answer_timeout_ms);
        let answer = tokio::time::timeout(timeout, self.post_offer(&local))
            .await
            .map_err(|_| {
                SessionError::Timeout(format!(
                    "remote answer timed out after {}ms",
                    self.config.answer_timeout_ms
                ))
            })??;
        if self.torn_down(attempt, transport.as_ref()) {
            return Ok(Outcome::Closed);
        }

        self.apply_answer(attempt, transport.as_ref(), answer).await
    }

    /// Suspend until ICE gathering completes. `Ok(false)` when torn down.
    async fn wait_ice_gathering(
        &self,
        attempt: u64,
        transport: &dyn PeerTransport,
    ) -> SessionResult<bool> {
        let mut ice = transport.ice_gathering_state();
        let timeout = Duration::from_millis(self.config.ice_gathering_timeout_ms);
        let gathered = tokio::time::timeout(
            timeout,
            ice.wait_for(|state| *state == IceGatheringState::Complete),
        )
        .await
        .map(|r| r.is_ok());

        if self.torn_down(attempt, transport) {
            return Ok(false);
        }
        match gathered {
            Ok(true) => Ok(true),
            Ok(false) => Err(SessionError::NegotiationFailed(
                "transport stopped before ICE gathering completed".to_string(),
            )),
            Err(_) => Err(SessionError::Timeout(format!(
                "ICE gathering timed out after {}ms",
                self.config.ice_gathering_timeout_ms
            ))),
        }
    }

    async fn post_offer(&self, local: &SessionDescription) -> SessionResult<AnswerResponse> {
        let body = OfferRequest::new(local, &self.config.avatar_id);
        let response = self
            .http
            .post(self.config.offer_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::NegotiationFailed(format!("offer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            // The body is ignored; the status alone signals failure.
            return Err(SessionError::NegotiationFailed(format!(
                "Server returned {}",
                status.as_u16()
            )));
        }

        let answer: AnswerResponse = response
            .json()
            .await
            .map_err(|e| SessionError::NegotiationFailed(format!("invalid answer body: {e}")))?;
        if answer.sdp_type != SdpType::Answer {
            return Err(SessionError::NegotiationFailed(format!(
                "expected an answer, got {}",
                answer.sdp_type
            )));
        }
        Ok(answer)
    }

    /// Publish the session identifier and apply the remote description as one
    /// step. If applying fails, the identifier is revoked before the failure
    /// is reported.
    async fn apply_answer(
        &self,
        attempt: u64,
        transport: &dyn PeerTransport,
        answer: AnswerResponse,
    ) -> SessionResult<Outcome> {
        let session_id = answer
            .session_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SessionError::NegotiationFailed("answer missing session id".to_string())
            })?;

        self.inner.lock().id = session_id.clone();
        self.publish_session_id(Some(session_id.clone()));

        let description = answer.description();
        let applied = transport.set_remote_description(description.clone()).await;

        if self.torn_down(attempt, transport) {
            self.revoke_session_id(attempt);
            return Ok(Outcome::Closed);
        }
        if let Err(e) = applied {
            self.revoke_session_id(attempt);
            return Err(SessionError::NegotiationFailed(format!(
                "failed to apply remote description: {e}"
            )));
        }

        self.inner.lock().remote_answer = Some(description);
        if !self.advance(attempt, transport, SessionState::Established) {
            self.revoke_session_id(attempt);
            return Ok(Outcome::Closed);
        }
        tracing::info!("Session {} established", session_id);
        Ok(Outcome::Established)
    }

    /// Close the session: release the transport and every track binding.
    ///
    /// Valid from any state and idempotent. An in-flight `start()` resolves
    /// to `Closed` rather than failing.
    pub fn close(&self) {
        if self.shut_down(None) {
            tracing::info!("Signaling session closed");
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Move to `Closed` and release everything the session holds. With
    /// `Some(attempt)`, only if that attempt is still the live one. Returns
    /// whether anything changed.
    fn shut_down(&self, attempt: Option<u64>) -> bool {
        let (transport, cancel, had_id) = {
            let mut inner = self.inner.lock();
            let stale = match attempt {
                Some(attempt) => inner.superseded(attempt),
                None => inner.state == SessionState::Closed,
            };
            if stale {
                return false;
            }
            inner.state = SessionState::Closed;
            inner.bindings.release_all();
            let had_id = !inner.id.is_empty();
            inner.id.clear();
            (inner.transport.take(), inner.cancel.take(), had_id)
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(transport) = transport {
            transport.close();
        }
        self.publish_state(SessionState::Closed);
        if had_id {
            self.publish_session_id(None);
        }
        true
    }

    fn register_track_handler(&self, transport: &dyn PeerTransport, attempt: u64) {
        let inner: Weak<Mutex<SessionInner>> = Arc::downgrade(&self.inner);
        let track_callback = self.track_callback.clone();
        let video_sink = self.config.video_sink_id.clone();
        let audio_sink = self.config.audio_sink_id.clone();

        transport.on_track(Arc::new(move |kind, stream| {
            let Some(inner) = inner.upgrade() else {
                stream.release();
                return;
            };
            let binding = {
                let mut inner = inner.lock();
                if inner.superseded(attempt) {
                    tracing::debug!("Dropping {} track from a stale negotiation", kind);
                    stream.release();
                    return;
                }
                let sink = match kind {
                    MediaKind::Video => &video_sink,
                    MediaKind::Audio => &audio_sink,
                };
                let binding = MediaTrackBinding::new(kind, stream, sink.clone());
                inner.bindings.bind(binding.clone());
                binding
            };
            tracing::info!("Remote {} track bound to {}", kind, binding.attached_sink_id);

            let callback = track_callback.lock().clone();
            if let Some(cb) = callback {
                cb(binding);
            }
        }));
    }

    fn torn_down(&self, attempt: u64, transport: &dyn PeerTransport) -> bool {
        self.inner.lock().superseded(attempt) || transport.is_closed()
    }

    /// Move to `state` unless the attempt was torn down.
    fn advance(&self, attempt: u64, transport: &dyn PeerTransport, state: SessionState) -> bool {
        if transport.is_closed() {
            return false;
        }
        {
            let mut inner = self.inner.lock();
            if inner.superseded(attempt) {
                return false;
            }
            inner.state = state;
        }
        self.publish_state(state);
        true
    }

    fn fail(&self, attempt: u64, error: &SessionError) {
        let (transport, had_id) = {
            let mut inner = self.inner.lock();
            if inner.superseded(attempt) {
                return;
            }
            inner.state = SessionState::Failed;
            inner.last_error = Some(error.cause());
            inner.bindings.release_all();
            inner.cancel = None;
            let had_id = !inner.id.is_empty();
            inner.id.clear();
            (inner.transport.take(), had_id)
        };

        if let Some(transport) = transport {
            transport.close();
        }
        tracing::error!("Negotiation failed: {}", error.cause());
        self.publish_state(SessionState::Failed);
        if had_id {
            self.publish_session_id(None);
        }
    }

    fn revoke_session_id(&self, attempt: u64) {
        let had_id = {
            let mut inner = self.inner.lock();
            if inner.attempt != attempt {
                return;
            }
            let had_id = !inner.id.is_empty();
            inner.id.clear();
            had_id
        };
        if had_id {
            self.publish_session_id(None);
        }
    }

    fn publish_state(&self, state: SessionState) {
        tracing::debug!("Signaling session -> {}", state);
        self.state_tx.send_replace(state);
    }

    fn publish_session_id(&self, id: Option<String>) {
        let callback = self.session_id_callback.lock().clone();
        if let Some(cb) = callback {
            cb(id);
        }
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.close();
    }
}
