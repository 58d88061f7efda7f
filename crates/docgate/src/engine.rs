//! Synchronization-engine boundary.
//!
//! The operational-transform engine that merges concurrent edits, maintains
//! snapshots and guarantees convergence lives outside this crate; the
//! gateway only consults and gates it through these traits. The in-memory
//! implementation backs tests and the demo server.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::EngineError;
use crate::protocol::DocRef;
use crate::session::{ConnectionId, SessionContext};

/// The engine as the gateway sees it.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Open the gateway's own connection into the engine, used for
    /// administrative document provisioning.
    async fn open_connection(&self) -> Result<Box<dyn EngineConnection>, EngineError>;

    /// Hand a forwarded (non-call) message to the engine's own receive
    /// handling. Messages arrive in the order the client submitted them.
    async fn receive(&self, session: &SessionContext, message: Value) -> Result<(), EngineError>;
}

/// A live connection into the engine.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Current snapshot of a document, `None` when it does not exist.
    async fn fetch(&self, doc: &DocRef) -> Result<Option<Value>, EngineError>;

    /// Create a document with an initial value.
    async fn create(&self, doc: &DocRef, value: Value) -> Result<(), EngineError>;
}

// ==================== In-Memory Engine ====================

/// In-memory engine used by tests and the demo server.
///
/// Documents live in a shared map keyed by document id; messages forwarded
/// past the multiplexer are recorded in arrival order for inspection.
#[derive(Default)]
pub struct MemoryEngine {
    documents: Arc<DashMap<String, Value>>,
    received: Mutex<Vec<(ConnectionId, Value)>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages forwarded to the engine, in arrival order per connection.
    pub fn received(&self) -> Vec<(ConnectionId, Value)> {
        self.received.lock().unwrap().clone()
    }

    /// Snapshot of a document, bypassing any connection.
    pub fn document(&self, doc: &DocRef) -> Option<Value> {
        self.documents
            .get(&doc.document_id())
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SyncEngine for MemoryEngine {
    async fn open_connection(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        Ok(Box::new(MemoryConnection {
            documents: self.documents.clone(),
        }))
    }

    async fn receive(&self, session: &SessionContext, message: Value) -> Result<(), EngineError> {
        debug!(
            "{}: synchronization message received",
            session.connection_id()
        );
        self.received
            .lock()
            .unwrap()
            .push((session.connection_id(), message));
        Ok(())
    }
}

struct MemoryConnection {
    documents: Arc<DashMap<String, Value>>,
}

#[async_trait]
impl EngineConnection for MemoryConnection {
    async fn fetch(&self, doc: &DocRef) -> Result<Option<Value>, EngineError> {
        Ok(self
            .documents
            .get(&doc.document_id())
            .map(|entry| entry.value().clone()))
    }

    async fn create(&self, doc: &DocRef, value: Value) -> Result<(), EngineError> {
        match self.documents.entry(doc.document_id()) {
            Entry::Occupied(_) => Err(EngineError::Backend(format!(
                "document {} already exists",
                doc
            ))),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }
}
