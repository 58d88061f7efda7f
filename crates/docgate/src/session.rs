//! Per-connection session state and the live-connection registry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::CallResponse;

/// Opaque acting identity, resolved once per connection from
/// connection-establishment credentials and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identity assigned when credential resolution fails or yields nothing.
    /// Unauthenticated connections exist, with minimal role.
    pub fn anonymous() -> Self {
        Self("guest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

pub type ConnectionId = Uuid;

/// Sender carrying serialized frames back to one client's transport.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Per-connection context, bound at connect time and dropped at disconnect.
///
/// Holds the resolved identity and the connection's in-flight call table.
/// Resolved roles are deliberately NOT cached here: a role may be
/// document-specific and may change at any time, so every check re-resolves.
pub struct SessionContext {
    connection_id: ConnectionId,
    identity: Identity,
    privileged: bool,
    outbound: Mutex<Option<Outbound>>,
    pending_calls: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl SessionContext {
    pub(crate) fn new(identity: Identity, privileged: bool, outbound: Option<Outbound>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            identity,
            privileged,
            outbound: Mutex::new(outbound),
            pending_calls: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The gateway's own internal connection bypasses every authorization
    /// check. Set once at construction and checked by value.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Track an in-flight call. Returns `false` when the correlation id is
    /// already outstanding on this connection — a collision would misroute
    /// the eventual response.
    pub(crate) fn begin_call(&self, correlation_id: &str) -> bool {
        self.pending_calls
            .lock()
            .unwrap()
            .insert(correlation_id.to_string())
    }

    pub(crate) fn finish_call(&self, correlation_id: &str) {
        self.pending_calls.lock().unwrap().remove(correlation_id);
    }

    /// Number of calls currently in flight on this connection.
    pub fn pending_call_count(&self) -> usize {
        self.pending_calls.lock().unwrap().len()
    }

    /// Send a frame back to the client. Frames addressed to a closed
    /// connection are dropped.
    pub fn send(&self, frame: String) {
        if self.is_closed() {
            debug!("connection {} closed, frame dropped", self.connection_id);
            return;
        }
        let outbound = self.outbound.lock().unwrap();
        if let Some(tx) = outbound.as_ref()
            && tx.send(frame).is_err()
        {
            debug!("connection {} gone, frame dropped", self.connection_id);
        }
    }

    /// Serialize and send a call response envelope.
    pub fn send_response(&self, response: &CallResponse) {
        if let Ok(frame) = serde_json::to_string(response) {
            self.send(frame);
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.outbound.lock().unwrap().take();
        let orphaned = {
            let mut pending = self.pending_calls.lock().unwrap();
            let count = pending.len();
            pending.clear();
            count
        };
        if orphaned > 0 {
            debug!(
                "connection {} closed with {} call(s) in flight",
                self.connection_id, orphaned
            );
        }
    }
}

/// One entry per live transport connection, keyed by connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<ConnectionId, Arc<SessionContext>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, session: Arc<SessionContext>) {
        self.sessions.insert(session.connection_id(), session);
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<SessionContext>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove a connection and abandon anything still in flight for it.
    /// Responses produced afterwards are dropped, never misdelivered.
    pub fn close(&self, id: &ConnectionId) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.close();
        }
    }
}
