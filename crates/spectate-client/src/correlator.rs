//! Request/response correlation over a single socket.
//!
//! Every outbound request registers a [`PendingRequest`] keyed by the
//! discriminator of the response it expects before the frame is sent.
//! Inbound frames are matched to pending requests by that discriminator,
//! never by arrival order, so a push event that lands between a request and
//! its response cannot be mistaken for the response. Frames with no waiting
//! request are routed to the push handler registered for their `op`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use spectate_core::protocol::peek_op;
use spectate_core::{ClientMessage, Result, ServerMessage, ServerOp, SpectateError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::transport::Transport;

/// Default deadline for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Which inbound frame resolves a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    /// The next frame carrying this discriminator.
    Op(ServerOp),
    /// Whatever frame arrives next, used for the connect handshake.
    FirstFrame,
}

impl Expect {
    fn describe(self) -> String {
        match self {
            Self::Op(op) => op.as_str().to_string(),
            Self::FirstFrame => "first frame".to_string(),
        }
    }
}

type PushHandler = Arc<dyn Fn(ServerMessage) + Send + Sync>;

/// One outstanding request.
struct PendingRequest {
    expect: Expect,
    reply: oneshot::Sender<Result<ServerMessage>>,
}

#[derive(Default)]
struct State {
    next_token: u64,
    pending: BTreeMap<u64, PendingRequest>,
    handlers: HashMap<ServerOp, PushHandler>,
}

impl State {
    /// Oldest pending request satisfied by a frame with `op`.
    fn take_match(&mut self, op: Option<ServerOp>) -> Option<PendingRequest> {
        let token = self
            .pending
            .iter()
            .find(|(_, p)| p.expect == Expect::FirstFrame)
            .or_else(|| {
                let op = op?;
                self.pending
                    .iter()
                    .find(|(_, p)| p.expect == Expect::Op(op))
            })
            .map(|(token, _)| *token)?;
        self.pending.remove(&token)
    }
}

/// Pending-request table plus push-event router for one session.
pub struct Correlator {
    timeout: Duration,
    state: Mutex<State>,
}

impl Correlator {
    /// Create a correlator whose requests expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Mutex::new(State::default()),
        }
    }

    /// Deadline applied to every request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Register a waiter for the next frame matching `expect`.
    ///
    /// Dropping the returned [`Waiter`] detaches it.
    pub fn expect(&self, expect: Expect) -> Waiter<'_> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        let _ = state.pending.insert(token, PendingRequest { expect, reply: tx });
        Waiter {
            correlator: self,
            token,
            expect,
            rx,
        }
    }

    /// Send `message` and wait for its correlated response.
    pub async fn request(
        &self,
        transport: &Transport,
        message: &ClientMessage,
    ) -> Result<ServerMessage> {
        let text = message.encode()?;
        let waiter = self.expect(Expect::Op(message.response_op()));
        transport.send(text)?;
        waiter.wait().await
    }

    /// Register the handler for unsolicited frames with discriminator `op`.
    ///
    /// Replaces any handler already registered for `op`.
    pub fn on_push<F>(&self, op: ServerOp, handler: F)
    where
        F: Fn(ServerMessage) + Send + Sync + 'static,
    {
        let _ = self.state.lock().handlers.insert(op, Arc::new(handler));
    }

    /// Route one inbound text frame.
    pub fn dispatch(&self, text: &str) {
        let (op, decoded) = match serde_json::from_str::<Value>(text) {
            Ok(value) => (peek_op(&value), ServerMessage::from_value(value)),
            Err(e) => (None, Err(SpectateError::from(e))),
        };

        let mut state = self.state.lock();
        if let Some(pending) = state.take_match(op) {
            drop(state);
            debug!(expect = %pending.expect.describe(), ok = decoded.is_ok(), "resolving pending request");
            // The waiter may have given up already.
            let _ = pending.reply.send(decoded);
            return;
        }

        match decoded {
            Ok(message) => {
                let handler = state.handlers.get(&message.op()).cloned();
                drop(state);
                match handler {
                    Some(handler) => {
                        debug!(op = %message.op(), "routing push event");
                        handler(message);
                    }
                    None => warn!(op = %message.op(), "no pending request or handler for frame, dropping"),
                }
            }
            Err(e) => {
                drop(state);
                warn!(op = ?op, error = %e, "dropping malformed frame");
            }
        }
    }

    /// Fail every pending request with `err` and drop all push handlers.
    pub fn fail_all(&self, err: &SpectateError) {
        let (pending, handlers) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.handlers),
            )
        };
        if !pending.is_empty() {
            debug!(count = pending.len(), error = %err, "failing pending requests");
        }
        for request in pending.into_values() {
            let _ = request.reply.send(Err(err.clone()));
        }
        drop(handlers);
    }

    fn detach(&self, token: u64) {
        let _ = self.state.lock().pending.remove(&token);
    }
}

/// Handle on a registered [`PendingRequest`].
pub struct Waiter<'a> {
    correlator: &'a Correlator,
    token: u64,
    expect: Expect,
    rx: oneshot::Receiver<Result<ServerMessage>>,
}

impl Waiter<'_> {
    /// Wait for the correlated frame or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<ServerMessage> {
        let timeout = self.correlator.timeout;
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SpectateError::NotConnected),
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(expect = %self.expect.describe(), timeout_ms, "request timed out");
                Err(SpectateError::Timeout {
                    timeout_ms,
                    context: self.expect.describe(),
                })
            }
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.correlator.detach(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    const LIST_OK: &str = r#"{"op":"list-broadcasts-response","broadcasts":[]}"#;
    const SPECTATE_OK: &str = r#"{"op":"spectate-broadcast-response","dolphinId":"d1"}"#;
    const CLOSED: &str = r#"{"op":"dolphin-closed-event","dolphinId":"d9"}"#;

    #[tokio::test]
    async fn resolves_by_discriminator_not_arrival_order() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let list = correlator.expect(Expect::Op(ServerOp::ListBroadcastsResponse));
        let spectate = correlator.expect(Expect::Op(ServerOp::SpectateBroadcastResponse));

        correlator.dispatch(SPECTATE_OK);
        correlator.dispatch(LIST_OK);

        assert_matches!(
            spectate.wait().await,
            Ok(ServerMessage::SpectateBroadcastResponse { dolphin_id: Some(id), .. }) if id == "d1"
        );
        assert_matches!(
            list.wait().await,
            Ok(ServerMessage::ListBroadcastsResponse { .. })
        );
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn push_event_between_request_and_response_goes_to_handler() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        correlator.on_push(ServerOp::DolphinClosedEvent, move |message| {
            assert_matches!(message, ServerMessage::DolphinClosedEvent { .. });
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });

        let waiter = correlator.expect(Expect::Op(ServerOp::SpectateBroadcastResponse));
        correlator.dispatch(CLOSED);
        correlator.dispatch(SPECTATE_OK);

        assert!(waiter.wait().await.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_frame_waiter_takes_any_frame() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let handshake = correlator.expect(Expect::FirstFrame);
        correlator.dispatch(CLOSED);
        assert_matches!(
            handshake.wait().await,
            Ok(ServerMessage::DolphinClosedEvent { .. })
        );
    }

    #[tokio::test]
    async fn first_frame_waiter_receives_malformed_frame_error() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let handshake = correlator.expect(Expect::FirstFrame);
        correlator.dispatch("not json");
        assert_matches!(
            handshake.wait().await,
            Err(SpectateError::ProtocolError(_))
        );
    }

    #[tokio::test]
    async fn malformed_response_fails_matching_request() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let waiter = correlator.expect(Expect::Op(ServerOp::SpectateBroadcastResponse));
        correlator.dispatch(r#"{"op":"spectate-broadcast-response"}"#);
        assert_matches!(waiter.wait().await, Err(SpectateError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn response_carrying_err_is_delivered_to_caller() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let waiter = correlator.expect(Expect::Op(ServerOp::ListBroadcastsResponse));
        correlator.dispatch(r#"{"op":"list-broadcasts-response","err":"boom"}"#);
        assert_matches!(
            waiter.wait().await,
            Ok(ServerMessage::ListBroadcastsResponse { err: Some(e), .. }) if e == "boom"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_detaches_waiter() {
        let correlator = Correlator::new(DEFAULT_REQUEST_TIMEOUT);
        for _ in 0..3 {
            let waiter = correlator.expect(Expect::Op(ServerOp::ListBroadcastsResponse));
            assert_matches!(
                waiter.wait().await,
                Err(SpectateError::Timeout { timeout_ms: 5000, .. })
            );
        }
        assert_eq!(correlator.pending_count(), 0);

        // A late response has nobody to resolve and no handler.
        correlator.dispatch(LIST_OK);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_resolves_every_waiter() {
        let correlator = Correlator::new(Duration::from_secs(30));
        let a = correlator.expect(Expect::Op(ServerOp::ListBroadcastsResponse));
        let b = correlator.expect(Expect::Op(ServerOp::SpectateBroadcastResponse));
        correlator.fail_all(&SpectateError::NotConnected);
        assert_matches!(a.wait().await, Err(SpectateError::NotConnected));
        assert_matches!(b.wait().await, Err(SpectateError::NotConnected));
    }

    #[tokio::test]
    async fn request_without_socket_is_not_connected_and_leaves_no_waiter() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let transport = Transport::new();
        let result = correlator
            .request(&transport, &ClientMessage::ListBroadcasts)
            .await;
        assert_matches!(result, Err(SpectateError::NotConnected));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn unroutable_frame_is_dropped() {
        let correlator = Correlator::new(Duration::from_secs(1));
        correlator.dispatch(CLOSED);
        correlator.dispatch("[1,2,3]");
        assert_eq!(correlator.pending_count(), 0);
    }
}
