use super::backoff::ReconnectPolicy;
use super::error::TransportError;
use super::serialization::BatchSerializer;
use super::{BatchTransport, ConnectionListener, ConnectionState};
use crate::buffer::Batch;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the collector URL from a `host:port` address.
///
/// A `ws://` prefix is accepted as well. TLS endpoints are rejected since the
/// client is built without a TLS backend.
pub fn collector_url(address: &str) -> Result<Url, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("address is empty"));
    }
    if address.starts_with("wss://") {
        return Err(invalid("TLS endpoints are not supported"));
    }

    let raw = if address.starts_with("ws://") {
        address.to_string()
    } else if address.contains("://") {
        return Err(invalid("only ws:// endpoints are supported"));
    } else {
        format!("ws://{address}/")
    };

    let url = Url::parse(&raw).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }

    Ok(url)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "socket.apianalytics.com:80".to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct ClientCounters {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub connects: u64,
    pub disconnects: u64,
}

/// WebSocket client for the collector.
///
/// Speaks plain WebSocket: each batch is one JSON text frame, with no
/// Socket.IO handshake, packet framing or acknowledgments. It cannot talk to
/// a Socket.IO collector endpoint.
///
/// `send` only serializes and hands the message to the connection task, which
/// owns the socket. Messages handed over while disconnected wait in the
/// outbound channel until the next successful connect.
pub struct CollectorClient {
    url: Url,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
    counters: Arc<ClientCounters>,
    serializer: BatchSerializer,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CollectorClient {
    /// Spawns the connection task on the current runtime. Never blocks.
    pub fn connect(
        config: ClientConfig,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<Self, TransportError> {
        let url = collector_url(&config.address)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let counters = Arc::new(ClientCounters::default());
        let cancel = CancellationToken::new();

        let connection = Connection {
            url: url.clone(),
            reconnect: config.reconnect,
            connect_timeout: config.connect_timeout,
            outbound: outbound_rx,
            state: state_tx,
            listener,
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(connection.run());

        info!(collector = %url, "Collector client started");

        Ok(Self {
            url,
            outbound,
            state,
            counters,
            serializer: BatchSerializer::new(),
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.counters.messages_dropped.load(Ordering::Relaxed),
            connects: self.counters.connects.load(Ordering::Relaxed),
            disconnects: self.counters.disconnects.load(Ordering::Relaxed),
        }
    }

    /// Stops the connection task after writing whatever is already handed over
    /// (when connected), then closes the socket.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!("Collector connection task failed: {e}");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }
}

impl BatchTransport for CollectorClient {
    fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }

        let payload = self.serializer.serialize_json(batch)?;
        debug!(entries = batch.size(), bytes = payload.len(), "Queued batch for collector");

        self.outbound
            .send(payload)
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for CollectorClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Shutdown,
    OutboundClosed,
    Lost(String),
}

struct Connection {
    url: Url,
    reconnect: ReconnectPolicy,
    connect_timeout: Duration,
    outbound: mpsc::UnboundedReceiver<String>,
    state: watch::Sender<ConnectionState>,
    listener: Arc<dyn ConnectionListener>,
    counters: Arc<ClientCounters>,
    cancel: CancellationToken,
}

impl Connection {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => break,
                outcome = self.open() => outcome,
            };

            match outcome {
                Ok(socket) => {
                    attempt = 0;
                    self.counters.connects.fetch_add(1, Ordering::Relaxed);
                    self.state.send_replace(ConnectionState::Connected);
                    info!(collector = %self.url, "Connected to collector");
                    self.listener.on_connected();

                    let end = self.drive(socket).await;

                    self.counters.disconnects.fetch_add(1, Ordering::Relaxed);
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.listener.on_disconnected();

                    match end {
                        SessionEnd::Shutdown => {
                            info!("Collector connection closed");
                            return;
                        }
                        SessionEnd::OutboundClosed => {
                            debug!("Collector client dropped, closing connection");
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!(collector = %self.url, "Disconnected from collector: {reason}");
                        }
                    }
                }
                Err(e) => {
                    warn!(collector = %self.url, attempt, "Failed to connect to collector: {e}");
                }
            }

            let delay = self.reconnect.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);

        let mut unsent = 0_u64;
        while self.outbound.try_recv().is_ok() {
            unsent += 1;
        }
        if unsent > 0 {
            self.counters.messages_dropped.fetch_add(unsent, Ordering::Relaxed);
            warn!(unsent, "Collector unreachable at shutdown, batches discarded");
        }
    }

    async fn open(&self) -> Result<Socket, TransportError> {
        let connecting = connect_async(self.url.as_str());
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })??;
        Ok(socket)
    }

    async fn drive(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    while let Ok(payload) = self.outbound.try_recv() {
                        if let Err(e) = sink.send(Message::Text(payload)).await {
                            self.counters.messages_dropped.fetch_add(1, Ordering::Relaxed);
                            error!("Failed to write batch during shutdown: {e}");
                            break;
                        }
                        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                payload = self.outbound.recv() => {
                    let Some(payload) = payload else {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::OutboundClosed;
                    };

                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        self.counters.messages_dropped.fetch_add(1, Ordering::Relaxed);
                        error!("Dropping batch, write to collector failed: {e}");
                        return SessionEnd::Lost(e.to_string());
                    }
                    self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Lost("closed by collector".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                },
            }
        }
    }
}
