//! In-memory media doubles.
//!
//! Stand-ins for the host's peer connection, remote streams and in-band data
//! channel so negotiation and routing can be driven without a real media
//! stack:
//! - `MockTransport` completes ICE gathering on demand and emits tracks
//! - `MockTransportFactory` records every transport it hands out
//! - `MockSubstrate` captures outbound control payloads

// Not every test binary uses every double.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use talking_avatar::core::animation::MorphTargetSink;
use talking_avatar::core::control::{ChannelResult, ControlSubstrate, SubstrateEvent};
use talking_avatar::core::media::{MediaKind, MediaStream, SharedMediaStream};
use talking_avatar::core::transport::{
    DataChannelHandle, IceGatheringState, PeerTransport, RemoteTrackCallback, SessionDescription,
    TransportError, TransportFactory, TransportResult,
};

/// Route library logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub const MOCK_OFFER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock\r\n";

// =============================================================================
// Streams
// =============================================================================

pub struct MockStream {
    id: String,
    active: AtomicBool,
    releases: AtomicUsize,
}

impl MockStream {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            active: AtomicBool::new(true),
            releases: AtomicUsize::new(0),
        })
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Control substrate
// =============================================================================

pub struct MockSubstrate {
    label: String,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSubstrate {
    /// A substrate plus the sender that drives its events.
    pub fn pair(label: &str) -> (Arc<Self>, mpsc::Sender<SubstrateEvent>, mpsc::Receiver<SubstrateEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let substrate = Arc::new(Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        (substrate, tx, rx)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlSubstrate for MockSubstrate {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, text: String) -> ChannelResult<()> {
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Transport
// =============================================================================

/// How a [`MockTransport`] behaves during negotiation.
#[derive(Debug, Clone, Copy)]
pub struct MockBehavior {
    /// Report ICE gathering complete as soon as the local description is set
    pub complete_ice: bool,
    /// Reject the remote description
    pub reject_answer: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            complete_ice: true,
            reject_answer: false,
        }
    }
}

pub struct MockTransport {
    behavior: MockBehavior,
    ice: watch::Sender<IceGatheringState>,
    transceivers: Mutex<Vec<MediaKind>>,
    track_callback: Mutex<Option<RemoteTrackCallback>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    data_channel: Mutex<Option<(Arc<MockSubstrate>, mpsc::Sender<SubstrateEvent>)>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        let (ice, _) = watch::channel(IceGatheringState::New);
        Arc::new(Self {
            behavior,
            ice,
            transceivers: Mutex::new(Vec::new()),
            track_callback: Mutex::new(None),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            data_channel: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn complete_ice(&self) {
        self.ice.send_replace(IceGatheringState::Complete);
    }

    /// Deliver a remote track as the host stack would.
    pub fn emit_track(&self, kind: MediaKind, stream: SharedMediaStream) {
        let callback = self.track_callback.lock().clone();
        if let Some(cb) = callback {
            cb(kind, stream);
        }
    }

    /// Close from the host side, as when the remote peer goes away.
    pub fn drop_connection(&self) {
        PeerTransport::close(self);
    }

    pub fn is_closed_flag(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn transceivers(&self) -> Vec<MediaKind> {
        self.transceivers.lock().clone()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn data_channel(&self) -> Option<Arc<MockSubstrate>> {
        self.data_channel.lock().as_ref().map(|(s, _)| s.clone())
    }

    /// Push an event onto the in-band data channel.
    pub async fn data_channel_event(&self, event: SubstrateEvent) {
        let tx = self.data_channel.lock().as_ref().map(|(_, tx)| tx.clone());
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    fn add_recv_only_transceiver(&self, kind: MediaKind) -> TransportResult<()> {
        self.transceivers.lock().push(kind);
        Ok(())
    }

    fn on_track(&self, callback: RemoteTrackCallback) {
        *self.track_callback.lock() = Some(callback);
    }

    fn create_data_channel(&self, label: &str) -> TransportResult<DataChannelHandle> {
        let (substrate, tx, events) = MockSubstrate::pair(label);
        *self.data_channel.lock() = Some((substrate.clone(), tx));
        Ok(DataChannelHandle { substrate, events })
    }

    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(SessionDescription::offer(MOCK_OFFER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> TransportResult<()> {
        *self.local.lock() = Some(description);
        self.ice.send_replace(IceGatheringState::Gathering);
        if self.behavior.complete_ice {
            self.complete_ice();
        }
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    fn ice_gathering_state(&self) -> watch::Receiver<IceGatheringState> {
        self.ice.subscribe()
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> TransportResult<()> {
        if self.behavior.reject_answer {
            return Err(TransportError::DescriptionRejected("malformed sdp".to_string()));
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some((substrate, _)) = self.data_channel.lock().take() {
            substrate.close();
        }
    }
}

/// Hands out fresh [`MockTransport`]s and keeps them for inspection.
#[derive(Default)]
pub struct MockTransportFactory {
    behavior: Mutex<MockBehavior>,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Behavior of transports created from now on.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn last(&self) -> Option<Arc<MockTransport>> {
        self.created.lock().last().cloned()
    }

    pub fn all(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> TransportResult<Arc<dyn PeerTransport>> {
        let transport = MockTransport::new(*self.behavior.lock());
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

// =============================================================================
// Server responses
// =============================================================================

pub fn answer_body(session_id: &str) -> serde_json::Value {
    serde_json::json!({
        "sessionId": session_id,
        "sdp": "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=answer\r\n",
        "type": "answer",
    })
}

// =============================================================================
// Meshes
// =============================================================================

/// A mesh with a fixed morph-target dictionary.
pub struct MockMesh {
    name: String,
    targets: Vec<String>,
    influences: Vec<f32>,
}

impl MockMesh {
    pub fn new(name: &str, targets: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            influences: vec![0.0; targets.len()],
        }
    }

    /// Current influence of the named target.
    pub fn get(&self, target: &str) -> Option<f32> {
        self.morph_target_index(target).map(|i| self.influences[i])
    }
}

impl MorphTargetSink for MockMesh {
    fn mesh_name(&self) -> &str {
        &self.name
    }

    fn morph_target_index(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t == name)
    }

    fn has_morph_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    fn influence(&self, index: usize) -> f32 {
        self.influences[index]
    }

    fn set_influence(&mut self, index: usize, value: f32) {
        self.influences[index] = value;
    }
}

/// Little-endian PCM16 sine wave.
pub fn sine_pcm16(freq: f32, sample_rate: u32, samples: usize, amplitude: f32) -> Vec<u8> {
    (0..samples)
        .flat_map(|n| {
            let t = n as f32 / sample_rate as f32;
            let value = (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude;
            ((value * i16::MAX as f32) as i16).to_le_bytes()
        })
        .collect()
}
