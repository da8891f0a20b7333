//! Typed operations against the spectate remote control service.
//!
//! A [`SpectateClient`] owns one [`Transport`] and, while connected, one
//! session: a [`Correlator`], a [`MappingStore`] and a
//! [`DolphinIdGenerator`]. A spawned pump feeds inbound frames to the
//! correlator; when the socket closes the pump fails every pending request,
//! clears the store, unpublishes the session and emits
//! [`SessionEvent::Disconnected`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use spectate_core::{
    Broadcast, ClientMessage, Result, ServerMessage, ServerOp, SpectateError, SpectatingBroadcast,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT, Expect};
use crate::ids::{DEFAULT_DOLPHIN_ID_PREFIX, DolphinIdGenerator};
use crate::mapping::MappingStore;
use crate::transport::{Connection, Transport, TransportEvent, TransportState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Client tuning.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Deadline for every correlated response, including the handshake.
    pub request_timeout: Duration,
    /// Prefix for generated dolphin ids.
    pub dolphin_id_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            dolphin_id_prefix: DEFAULT_DOLPHIN_ID_PREFIX.to_string(),
        }
    }
}

/// One-way notifications about the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server reported that a playback instance closed.
    DolphinClosed {
        /// Instance that went away.
        dolphin_id: String,
        /// Broadcast it was showing, if we knew of one.
        broadcast_id: Option<String>,
    },
    /// The socket closed; all session state is gone.
    Disconnected,
}

/// State scoped to one connected socket.
struct Session {
    correlator: Correlator,
    mappings: Arc<RwLock<MappingStore>>,
    ids: Mutex<DolphinIdGenerator>,
    /// Serializes requests so each response discriminator has one waiter.
    turn: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl Session {
    fn new(config: &ClientConfig) -> Self {
        Self {
            correlator: Correlator::new(config.request_timeout),
            mappings: Arc::new(RwLock::new(MappingStore::new())),
            ids: Mutex::new(DolphinIdGenerator::new(config.dolphin_id_prefix.clone())),
            turn: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.correlator.fail_all(&SpectateError::NotConnected);
        self.mappings.write().clear_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

type SessionSlot = Arc<RwLock<Option<Arc<Session>>>>;

/// Client for the spectate remote control service.
pub struct SpectateClient {
    config: ClientConfig,
    transport: Transport,
    session: SessionSlot,
    connect_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SpectateClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl SpectateClient {
    /// Create a disconnected client.
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            transport: Transport::new(),
            session: Arc::new(RwLock::new(None)),
            connect_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    /// Whether a session is live: published, not shut down, and backed by a
    /// connected transport.
    pub fn is_connected(&self) -> bool {
        self.live_session().is_ok()
    }

    /// Subscribe to session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of requests waiting on a response in the live session.
    pub fn pending_requests(&self) -> usize {
        self.session
            .read()
            .as_ref()
            .map_or(0, |session| session.correlator.pending_count())
    }

    /// Connect and perform the mapping-snapshot handshake.
    ///
    /// No-op while a session is live, meaning a published session that has
    /// not been shut down on a transport that is still `Connected`. A session
    /// whose socket already went away is retired first. The first frame the
    /// server sends must be a `spectating-broadcasts-event`; anything else
    /// fails the call and closes the socket.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_connected() {
            debug!(endpoint, "already connected");
            return Ok(());
        }
        let stale = self.session.write().take();
        if let Some(stale) = stale {
            self.retire(&stale);
        }

        let inbound = match self.transport.connect(endpoint).await? {
            Connection::Opened(inbound) => inbound,
            Connection::AlreadyOpen => {
                self.transport.close();
                return Err(SpectateError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: "socket was open without a session".into(),
                });
            }
        };

        let session = Arc::new(Session::new(&self.config));
        self.register_push_handlers(&session);
        let handshake = session.correlator.expect(Expect::FirstFrame);
        drop(tokio::spawn(pump(
            inbound,
            Arc::clone(&session),
            Arc::clone(&self.session),
            self.events.clone(),
        )));

        let outcome = handshake.wait().await.and_then(|first| match first {
            ServerMessage::SpectatingBroadcastsEvent {
                spectating_broadcasts,
            } => session.mappings.write().snapshot_replace(spectating_broadcasts),
            other => Err(SpectateError::ProtocolError(format!(
                "expected {} as first frame, got {}",
                ServerOp::SpectatingBroadcastsEvent,
                other.op()
            ))),
        });

        if let Err(err) = outcome {
            warn!(endpoint, error = %err, kind = err.error_kind(), "spectate handshake failed");
            self.transport.close();
            session.shutdown();
            return Err(match err {
                SpectateError::NotConnected => SpectateError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: "connection closed before handshake".into(),
                },
                other => other,
            });
        }

        {
            let mut slot = self.session.write();
            if session.is_closed() {
                return Err(SpectateError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: "connection closed during handshake".into(),
                });
            }
            *slot = Some(Arc::clone(&session));
        }

        info!(
            endpoint,
            spectating = session.mappings.read().len(),
            "connected to spectate remote control"
        );
        Ok(())
    }

    /// Close the socket and drop the session.
    ///
    /// Pending requests fail with `NotConnected`, the mapping store is cleared
    /// and [`SessionEvent::Disconnected`] is emitted before this returns.
    pub fn disconnect(&self) {
        let session = self.session.write().take();
        self.transport.close();
        if let Some(session) = session {
            self.retire(&session);
        }
    }

    /// List every broadcast the server knows about.
    pub async fn list_broadcasts(&self) -> Result<Vec<Broadcast>> {
        let session = self.live_session()?;
        let _turn = session.turn.lock().await;
        let response = session
            .correlator
            .request(&self.transport, &ClientMessage::ListBroadcasts)
            .await?;

        match response {
            ServerMessage::ListBroadcastsResponse { err: Some(err), .. } => {
                Err(SpectateError::RemoteError(err))
            }
            ServerMessage::ListBroadcastsResponse {
                broadcasts: Some(broadcasts),
                err: None,
            } => {
                debug!(count = broadcasts.len(), "listed broadcasts");
                Ok(broadcasts)
            }
            other => Err(unexpected_response(&other, "list-broadcasts-request")),
        }
    }

    /// Broadcasts currently routed into playback instances.
    ///
    /// Reads local state only.
    pub fn currently_spectated(&self) -> Result<Vec<SpectatingBroadcast>> {
        let session = self.live_session()?;
        let entries = session.mappings.read().entries();
        Ok(entries)
    }

    /// Make sure `broadcast_id` is being spectated and return its dolphin id.
    ///
    /// Returns the existing id without a round-trip if the broadcast is
    /// already mapped. Otherwise asks for `preferred_dolphin_id` (or a freshly
    /// generated id); the server may answer with a different one, and that
    /// answer is what gets recorded and returned.
    pub async fn spectate_broadcast(
        &self,
        broadcast_id: &str,
        preferred_dolphin_id: Option<&str>,
    ) -> Result<String> {
        let session = self.live_session()?;
        let _turn = session.turn.lock().await;

        if let Some(existing) = session.mappings.read().lookup_dolphin_id(broadcast_id) {
            debug!(broadcast_id, dolphin_id = existing, "broadcast already spectated");
            return Ok(existing.to_string());
        }

        let requested = match preferred_dolphin_id {
            Some(id) => id.to_string(),
            None => {
                let mappings = session.mappings.read();
                session
                    .ids
                    .lock()
                    .next_id(|id| mappings.lookup_broadcast_id(id).is_some())
            }
        };

        let request = ClientMessage::SpectateBroadcast {
            broadcast_id: broadcast_id.to_string(),
            dolphin_id: requested.clone(),
        };
        let response = session.correlator.request(&self.transport, &request).await?;

        match response {
            ServerMessage::SpectateBroadcastResponse { err: Some(err), .. } => {
                Err(SpectateError::RemoteError(err))
            }
            ServerMessage::SpectateBroadcastResponse {
                dolphin_id: Some(actual),
                err: None,
            } => {
                session.mappings.write().upsert(broadcast_id, &actual);
                info!(
                    broadcast_id,
                    requested = %requested,
                    dolphin_id = %actual,
                    "spectating broadcast"
                );
                Ok(actual)
            }
            other => Err(unexpected_response(&other, "spectate-broadcast-request")),
        }
    }

    fn live_session(&self) -> Result<Arc<Session>> {
        if self.transport.state() != TransportState::Connected {
            return Err(SpectateError::NotConnected);
        }
        self.session
            .read()
            .as_ref()
            .filter(|session| !session.is_closed())
            .cloned()
            .ok_or(SpectateError::NotConnected)
    }

    /// Shut down a session already taken out of the slot.
    fn retire(&self, session: &Session) {
        session.shutdown();
        info!("spectate session closed");
        let _ = self.events.send(SessionEvent::Disconnected);
    }

    fn register_push_handlers(&self, session: &Session) {
        let mappings = Arc::clone(&session.mappings);
        let events = self.events.clone();
        session
            .correlator
            .on_push(ServerOp::DolphinClosedEvent, move |message| {
                if let ServerMessage::DolphinClosedEvent { dolphin_id } = message {
                    let broadcast_id = mappings.write().remove_by_dolphin_id(&dolphin_id);
                    info!(dolphin_id = %dolphin_id, ?broadcast_id, "dolphin closed");
                    let _ = events.send(SessionEvent::DolphinClosed {
                        dolphin_id,
                        broadcast_id,
                    });
                }
            });

        let mappings = Arc::clone(&session.mappings);
        session
            .correlator
            .on_push(ServerOp::SpectatingBroadcastsEvent, move |message| {
                if let ServerMessage::SpectatingBroadcastsEvent {
                    spectating_broadcasts,
                } = message
                {
                    if let Err(e) = mappings.write().snapshot_replace(spectating_broadcasts) {
                        warn!(error = %e, "ignoring invalid mapping snapshot");
                    }
                }
            });
    }
}

fn unexpected_response(message: &ServerMessage, request: &str) -> SpectateError {
    SpectateError::ProtocolError(format!("unexpected {} in reply to {request}", message.op()))
}

/// Feed inbound frames to the session until the socket closes.
async fn pump(
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    session: Arc<Session>,
    slot: SessionSlot,
    events: broadcast::Sender<SessionEvent>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Frame(text) => session.correlator.dispatch(&text),
            TransportEvent::Closed => break,
        }
    }

    session.shutdown();
    let was_live = {
        let mut slot = slot.write();
        if slot
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(live, &session))
        {
            *slot = None;
            true
        } else {
            false
        }
    };
    if was_live {
        info!("spectate session closed");
        let _ = events.send(SessionEvent::Disconnected);
    }
}
