//! The gateway's own privileged connection into the engine.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::engine::{EngineConnection, SyncEngine};
use crate::error::EngineError;
use crate::protocol::DocRef;
use crate::session::{ConnectionRegistry, Identity, SessionContext};

enum RootState {
    Uninitialized,
    Connecting,
    Connected(Box<dyn EngineConnection>),
}

/// The distinguished internal connection used for administrative document
/// provisioning.
///
/// Created once at gateway startup and exempt from every authorization
/// check; the exemption is an explicit tag on its session, checked by value.
/// Provisioning is only valid once the engine handshake completed. There is
/// no disconnect transition — teardown is process shutdown.
pub struct PrivilegedContext {
    session: Arc<SessionContext>,
    state: RwLock<RootState>,
}

impl PrivilegedContext {
    pub(crate) fn new(registry: &ConnectionRegistry) -> Self {
        let session = Arc::new(SessionContext::new(Identity::new("root"), true, None));
        registry.insert(session.clone());
        Self {
            session,
            state: RwLock::new(RootState::Uninitialized),
        }
    }

    /// The privileged session context, usable in any hook payload.
    pub fn session(&self) -> Arc<SessionContext> {
        self.session.clone()
    }

    /// Complete the engine handshake. Idempotent once connected; concurrent
    /// callers serialize on the state lock.
    pub(crate) async fn connect(&self, engine: &dyn SyncEngine) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        if matches!(*state, RootState::Connected(_)) {
            return Ok(());
        }
        *state = RootState::Connecting;
        match engine.open_connection().await {
            Ok(connection) => {
                *state = RootState::Connected(connection);
                info!("privileged engine connection established");
                Ok(())
            }
            Err(e) => {
                *state = RootState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Fetch a document snapshot through the privileged connection.
    pub async fn fetch_document(&self, doc: &DocRef) -> Result<Option<Value>, EngineError> {
        match &*self.state.read().await {
            RootState::Connected(connection) => connection.fetch(doc).await,
            _ => Err(EngineError::NotConnected),
        }
    }

    /// Create a document through the privileged connection.
    pub async fn create_document(&self, doc: &DocRef, value: Value) -> Result<(), EngineError> {
        match &*self.state.read().await {
            RootState::Connected(connection) => connection.create(doc, value).await,
            _ => Err(EngineError::NotConnected),
        }
    }
}
