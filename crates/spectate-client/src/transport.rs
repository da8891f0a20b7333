//! Persistent WebSocket link to the spectate control service.
//!
//! The socket is owned by a spawned loop that forwards outbound frames from
//! an `mpsc` channel and pushes inbound text frames to whoever opened the
//! link. When the socket ends for any reason the loop emits exactly one
//! [`TransportEvent::Closed`]. The transport keeps no session state of its
//! own; upstream owners clear theirs when they see the close.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use spectate_core::protocol::SUBPROTOCOL;
use spectate_core::{Result, SpectateError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    /// No socket.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Socket open.
    Connected,
}

/// What the socket loop hands upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound text frame.
    Frame(String),
    /// The socket is gone. Always the last event.
    Closed,
}

/// Outcome of [`Transport::connect`].
#[derive(Debug)]
pub enum Connection {
    /// A fresh socket; its inbound events arrive on the receiver.
    Opened(mpsc::UnboundedReceiver<TransportEvent>),
    /// A socket was already open and nothing changed.
    AlreadyOpen,
}

/// Owner of at most one socket.
#[derive(Clone, Default)]
pub struct Transport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    slot: Mutex<Slot>,
    next_generation: AtomicU64,
}

#[derive(Default)]
struct Slot {
    state: TransportState,
    link: Option<Link>,
}

struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    _task: JoinHandle<()>,
}

impl Transport {
    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.inner.slot.lock().state
    }

    /// Open the socket, announcing the spectate sub-protocol.
    ///
    /// No-op if a socket is already open.
    pub async fn connect(&self, endpoint: &str) -> Result<Connection> {
        {
            let mut slot = self.inner.slot.lock();
            match slot.state {
                TransportState::Connected => return Ok(Connection::AlreadyOpen),
                TransportState::Connecting => {
                    return Err(SpectateError::ConnectFailed {
                        endpoint: endpoint.to_string(),
                        reason: "another connection attempt is in progress".into(),
                    });
                }
                TransportState::Disconnected => slot.state = TransportState::Connecting,
            }
        }
        let attempt = ConnectAttempt {
            inner: &self.inner,
            armed: true,
        };

        let ws = open_socket(endpoint).await?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Spawn under the lock so the loop cannot release a link that is not installed yet.
        let mut slot = self.inner.slot.lock();
        let task = tokio::spawn(socket_loop(
            ws,
            out_rx,
            in_tx,
            Arc::clone(&self.inner),
            generation,
        ));
        slot.link = Some(Link {
            generation,
            outbound: out_tx,
            _task: task,
        });
        slot.state = TransportState::Connected;
        attempt.disarm();

        info!(endpoint, generation, "spectate socket connected");
        Ok(Connection::Opened(in_rx))
    }

    /// Queue a text frame on the open socket.
    pub fn send(&self, text: String) -> Result<()> {
        let slot = self.inner.slot.lock();
        let link = slot.link.as_ref().ok_or(SpectateError::NotConnected)?;
        trace!(generation = link.generation, frame = %text, "sending frame");
        link.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| SpectateError::NotConnected)
    }

    /// Close the socket if one is open.
    ///
    /// The loop still emits [`TransportEvent::Closed`] to the receiver that
    /// was handed out when the socket opened.
    pub fn close(&self) {
        let mut slot = self.inner.slot.lock();
        if let Some(link) = slot.link.take() {
            debug!(generation = link.generation, "closing spectate socket");
            slot.state = TransportState::Disconnected;
        }
    }
}

impl Inner {
    fn release(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot
            .link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
        {
            slot.link = None;
            slot.state = TransportState::Disconnected;
        }
    }
}

/// Resets a `Connecting` state if the connect future fails or is dropped.
struct ConnectAttempt<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl ConnectAttempt<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = self.inner.slot.lock();
            if slot.state == TransportState::Connecting {
                slot.state = TransportState::Disconnected;
            }
        }
    }
}

async fn open_socket(endpoint: &str) -> Result<WsStream> {
    let fail = |reason: String| SpectateError::ConnectFailed {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut request = endpoint
        .into_client_request()
        .map_err(|e| fail(e.to_string()))?;
    let _ = request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    let (ws, response) = connect_async(request)
        .await
        .map_err(|e| fail(e.to_string()))?;
    debug!(endpoint, status = %response.status(), "websocket handshake complete");
    Ok(ws)
}

/// Socket loop.
///
/// Forwards outbound frames, hands inbound text frames upstream, and emits
/// a single `Closed` when either side ends the connection.
async fn socket_loop(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    inner: Arc<Inner>,
    generation: u64,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    // Transport closed or dropped.
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(generation, error = %e, "websocket write failed");
                    break;
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!(generation, frame = %text, "received frame");
                        if inbound.send(TransportEvent::Frame(text.to_string())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        warn!(generation, len = bytes.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(generation, ?frame, "socket closed by server");
                        break;
                    }
                    // Ping/pong are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "websocket read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    inner.release(generation);
    info!(generation, "spectate socket closed");
    let _ = inbound.send(TransportEvent::Closed);
}
