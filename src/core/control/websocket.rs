//! Socket substrate for the control channel.
//!
//! Used when the deployment runs the control channel over an independent
//! WebSocket endpoint (`/ws`) instead of the negotiated connection's in-band
//! data channel. Payloads are the same JSON envelope either way.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::base::{ChannelError, ChannelResult, ControlSubstrate, SubstrateEvent};

/// Channel capacity for outbound and inbound socket traffic.
const WS_CHANNEL_CAPACITY: usize = 256;

/// WebSocket-backed control substrate.
pub struct WebSocketSubstrate {
    url: String,
    outgoing: mpsc::Sender<String>,
    cancel: CancellationToken,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketSubstrate {
    /// Start connecting to `url` in the background.
    ///
    /// Returns immediately with the substrate and its event receiver. The
    /// receiver yields [`SubstrateEvent::Open`] once the handshake completes and
    /// [`SubstrateEvent::Close`] when the socket ends for any reason,
    /// including a failed handshake.
    pub fn open(url: &str) -> ChannelResult<(Arc<Self>, mpsc::Receiver<SubstrateEvent>)> {
        let parsed =
            Url::parse(url).map_err(|e| ChannelError::Substrate(format!("invalid url {url}: {e}")))?;
        match parsed.scheme() {
            "ws" => {}
            "wss" => {
                // Another component may already have installed a provider.
                let _ = rustls::crypto::ring::default_provider().install_default();
            }
            other => {
                return Err(ChannelError::Substrate(format!(
                    "unsupported scheme '{other}', expected ws or wss"
                )));
            }
        }

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<SubstrateEvent>(WS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_url = parsed.to_string();
        let handle = tokio::spawn(async move {
            let connect = tokio::select! {
                _ = task_cancel.cancelled() => {
                    let _ = event_tx.send(SubstrateEvent::Close).await;
                    return;
                }
                result = tokio_tungstenite::connect_async(task_url.as_str()) => result,
            };

            let ws_stream = match connect {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::error!("Control socket connection to {} failed: {}", task_url, e);
                    let _ = event_tx.send(SubstrateEvent::Close).await;
                    return;
                }
            };

            tracing::info!("Control socket connected to {}", task_url);
            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            if event_tx.send(SubstrateEvent::Open).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }

                    Some(text) = outgoing_rx.recv() => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            tracing::error!("Failed to send control socket message: {}", e);
                            break;
                        }
                    }

                    msg = ws_stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if event_tx.send(SubstrateEvent::Message(text.as_str().to_string())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            match String::from_utf8(data.to_vec()) {
                                Ok(text) => {
                                    if event_tx.send(SubstrateEvent::Message(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::warn!("Dropping non UTF-8 control frame: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Control socket closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::error!("Control socket error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                }
            }

            let _ = event_tx.send(SubstrateEvent::Close).await;
            tracing::debug!("Control socket task for {} ended", task_url);
        });

        let substrate = Arc::new(Self {
            url: parsed.to_string(),
            outgoing: outgoing_tx,
            cancel,
            connection_handle: Mutex::new(Some(handle)),
        });
        Ok((substrate, event_rx))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ControlSubstrate for WebSocketSubstrate {
    fn label(&self) -> &str {
        &self.url
    }

    async fn send(&self, text: String) -> ChannelResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        self.outgoing
            .send(text)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        // The task sends its own close frame; drop our handle so it can finish.
        self.connection_handle.lock().take();
    }
}

impl Drop for WebSocketSubstrate {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
