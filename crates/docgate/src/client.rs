//! Call-issuing side of the multiplexing protocol.
//!
//! [`CallClient`] shares one bidirectional channel with the synchronization
//! protocol: calls go out with fresh correlation ids, responses are routed
//! back to exactly one waiting caller regardless of arrival order, and all
//! other traffic is left for the caller's own synchronization handling.

use dashmap::DashMap;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::CallError;
use crate::protocol::CallResponse;
use crate::session::Outbound;

/// Issues calls over a shared transport and correlates their responses.
#[derive(Clone)]
pub struct CallClient {
    outbound: Outbound,
    pending: Arc<DashMap<String, oneshot::Sender<CallResponse>>>,
}

impl CallClient {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Number of calls awaiting their response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Issue a call and wait for its correlated response.
    ///
    /// The pending entry exists from send until the matching response
    /// arrives or the connection closes; either way it is removed.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        let envelope = json!({
            "correlationId": correlation_id,
            "method": method,
            "args": args,
        });
        if self.outbound.send(envelope.to_string()).is_err() {
            self.pending.remove(&correlation_id);
            return Err(CallError::Failed("connection closed".to_string()));
        }

        let response = rx.await.map_err(|_| {
            CallError::Failed("connection closed before the response arrived".to_string())
        })?;
        match response.error {
            Some(error) => Err(CallError::Failed(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Route one inbound message. Returns `true` when it was consumed as a
    /// call response; everything else belongs to the synchronization
    /// protocol and is left untouched.
    pub fn handle_message(&self, message: &Value) -> bool {
        let Some(id) = message.get("correlationId").and_then(Value::as_str) else {
            return false;
        };
        let Some((_, resolver)) = self.pending.remove(id) else {
            // A response whose call was abandoned; drop it.
            debug!("response for unknown call '{}' dropped", id);
            return true;
        };
        let response = serde_json::from_value(message.clone())
            .unwrap_or_else(|_| CallResponse::err(id, "malformed response envelope"));
        let _ = resolver.send(response);
        true
    }

    /// Abandon every in-flight call; their callers observe the closed
    /// connection. Nothing leaks past disconnect.
    pub fn close(&self) {
        self.pending.clear();
    }
}
