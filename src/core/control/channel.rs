//! Control channel over an arbitrary substrate.
//!
//! # Example
//!
//! ```rust,ignore
//! use talking_avatar::core::control::{ControlChannel, ControlMessage, WebSocketSubstrate};
//! use std::sync::Arc;
//!
//! let (substrate, events) = WebSocketSubstrate::open("ws://localhost:8080/ws")?;
//! let channel = ControlChannel::new(substrate);
//! channel.on_message(Arc::new(|msg| Box::pin(async move {
//!     println!("{}: {:?}", msg.type_name(), msg.content());
//! })));
//! channel.start(events);
//!
//! channel.wait_open(Duration::from_secs(5)).await?;
//! channel.send(&ControlMessage::text("user", "hello")).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::base::{
    ChannelError, ChannelResult, ChannelState, ChannelStateCallback, ControlMessageCallback,
    ControlSubstrate, SubstrateEvent,
};
use super::messages::ControlMessage;

/// Bidirectional structured-message channel.
///
/// Outbound sends are fire-and-forget (at most once). Inbound payloads that
/// fail to decode are logged and dropped; they never close the channel.
pub struct ControlChannel {
    id: Uuid,
    substrate: Arc<dyn ControlSubstrate>,
    state_tx: watch::Sender<ChannelState>,
    message_callback: Arc<Mutex<Option<ControlMessageCallback>>>,
    state_callback: Arc<Mutex<Option<ChannelStateCallback>>>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ControlChannel {
    /// Wrap a substrate. Nothing flows until [`ControlChannel::start`] is called,
    /// so callbacks registered in between see every message.
    pub fn new(substrate: Arc<dyn ControlSubstrate>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        Arc::new(Self {
            id: Uuid::new_v4(),
            substrate,
            state_tx,
            message_callback: Arc::new(Mutex::new(None)),
            state_callback: Arc::new(Mutex::new(None)),
            dispatch_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        self.substrate.label()
    }

    /// Register the callback for decoded inbound messages.
    pub fn on_message(&self, callback: ControlMessageCallback) {
        *self.message_callback.lock() = Some(callback);
    }

    /// Register the callback for state changes.
    pub fn on_state_change(&self, callback: ChannelStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Start dispatching substrate events. Calling it twice has no effect.
    pub fn start(self: &Arc<Self>, mut events: mpsc::Receiver<SubstrateEvent>) {
        let mut handle = self.dispatch_handle.lock();
        if handle.is_some() {
            tracing::warn!("Control channel {} already started", self.id);
            return;
        }

        let channel = Arc::clone(self);
        let cancel = self.cancel.clone();
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(SubstrateEvent::Open) => channel.set_state(ChannelState::Open),
                        Some(SubstrateEvent::Message(payload)) => channel.dispatch(payload).await,
                        Some(SubstrateEvent::Close) | None => break,
                    },
                }
            }
            channel.set_state(ChannelState::Closed);
            tracing::debug!("Control channel {} dispatch loop ended", channel.id);
        }));
    }

    fn set_state(&self, state: ChannelState) {
        let changed = self.state_tx.send_if_modified(|current| {
            // Closed is terminal.
            if *current == state || *current == ChannelState::Closed {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::info!("Control channel {} ({}) is {}", self.id, self.label(), state);
            let callback = self.state_callback.lock().clone();
            if let Some(cb) = callback {
                cb(state);
            }
        }
    }

    async fn dispatch(&self, payload: String) {
        let message = match ControlMessage::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping control payload: {} - {}", e, payload);
                return;
            }
        };

        if matches!(message, ControlMessage::Unknown) {
            tracing::debug!("Ignoring control message of unknown type: {}", payload);
            return;
        }

        let callback = self.message_callback.lock().clone();
        if let Some(cb) = callback {
            cb(message).await;
        }
    }

    /// Send a message. Fails with [`ChannelError::ChannelNotReady`] before the
    /// substrate opened.
    pub async fn send(&self, message: &ControlMessage) -> ChannelResult<()> {
        match self.state() {
            ChannelState::Connecting => return Err(ChannelError::ChannelNotReady),
            ChannelState::Closed => return Err(ChannelError::Closed),
            ChannelState::Open => {}
        }

        let payload = message.encode()?;
        tracing::debug!("Sending {} message on {}", message.type_name(), self.label());
        self.substrate.send(payload).await
    }

    /// Wait until the channel is open.
    pub async fn wait_open(&self, timeout: Duration) -> ChannelResult<()> {
        let mut rx = self.state_tx.subscribe();
        let wait = rx.wait_for(|state| *state != ChannelState::Connecting);
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) if *state == ChannelState::Open => Ok(()),
            Ok(_) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Timeout(format!(
                "control channel not open after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Close the channel and its substrate. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        self.substrate.close();
        if let Some(handle) = self.dispatch_handle.lock().take() {
            handle.abort();
        }
        self.set_state(ChannelState::Closed);
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.substrate.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSubstrate {
        sent: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    impl RecordingSubstrate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ControlSubstrate for RecordingSubstrate {
        fn label(&self) -> &str {
            "recording"
        }

        async fn send(&self, text: String) -> ChannelResult<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn collecting_callback() -> (ControlMessageCallback, Arc<Mutex<Vec<ControlMessage>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let cb: ControlMessageCallback = Arc::new(move |msg| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(msg);
            })
        });
        (cb, received)
    }

    #[tokio::test]
    async fn test_send_before_open_is_not_ready() {
        let substrate = RecordingSubstrate::new();
        let channel = ControlChannel::new(substrate.clone());
        let (_tx, rx) = mpsc::channel(8);
        channel.start(rx);

        let result = channel.send(&ControlMessage::text("user", "hi")).await;
        assert!(matches!(result, Err(ChannelError::ChannelNotReady)));
        assert!(substrate.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_open() {
        let substrate = RecordingSubstrate::new();
        let channel = ControlChannel::new(substrate.clone());
        let (tx, rx) = mpsc::channel(8);
        channel.start(rx);

        tx.send(SubstrateEvent::Open).await.unwrap();
        channel.wait_open(Duration::from_secs(1)).await.unwrap();

        channel.send(&ControlMessage::text("user", "one")).await.unwrap();
        channel.send(&ControlMessage::text("user", "two")).await.unwrap();

        let sent = substrate.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("one"));
        assert!(sent[1].contains("two"));
    }

    #[tokio::test]
    async fn test_decode_failures_do_not_close_channel() {
        let substrate = RecordingSubstrate::new();
        let channel = ControlChannel::new(substrate);
        let (cb, received) = collecting_callback();
        channel.on_message(cb);
        let (tx, rx) = mpsc::channel(8);
        channel.start(rx);

        tx.send(SubstrateEvent::Open).await.unwrap();
        tx.send(SubstrateEvent::Message("{broken".to_string()))
            .await
            .unwrap();
        tx.send(SubstrateEvent::Message(r#"{"type":"whatever"}"#.to_string()))
            .await
            .unwrap();
        tx.send(SubstrateEvent::Message(
            r#"{"type":"llm","content":"still here"}"#.to_string(),
        ))
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while received.lock().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(received.lock().len(), 1);
        assert_eq!(received.lock()[0].content(), Some("still here"));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_substrate_close_closes_channel() {
        let channel = ControlChannel::new(RecordingSubstrate::new());
        let (tx, rx) = mpsc::channel(8);
        channel.start(rx);

        tx.send(SubstrateEvent::Open).await.unwrap();
        tx.send(SubstrateEvent::Close).await.unwrap();

        let mut state = channel.state_tx.subscribe();
        state
            .wait_for(|s| *s == ChannelState::Closed)
            .await
            .unwrap();

        let result = channel.send(&ControlMessage::system("bye")).await;
        assert!(matches!(result, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let substrate = RecordingSubstrate::new();
        let channel = ControlChannel::new(substrate.clone());
        let (_tx, rx) = mpsc::channel(8);
        channel.start(rx);

        channel.close();
        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(substrate.closes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_wait_open_times_out() {
        let channel = ControlChannel::new(RecordingSubstrate::new());
        let (_tx, rx) = mpsc::channel(8);
        channel.start(rx);

        let result = channel.wait_open(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ChannelError::Timeout(_))));
    }
}
