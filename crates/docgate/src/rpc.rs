//! Call multiplexing over the synchronization transport.
//!
//! Clients issue request/response calls on the same bidirectional channel
//! the synchronization protocol uses. Any inbound message carrying a
//! `correlationId` is a call: it is dispatched to a named handler, answered
//! with a correlated response envelope, and never allowed to reach the
//! engine's own receive handling. Everything else is forwarded unchanged.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CallError, GatewayError};
use crate::hooks::Decision;
use crate::protocol::{CallRequest, CallResponse, DocRef};
use crate::resolver::RoleResolver;
use crate::roles::Role;
use crate::session::SessionContext;

/// Reason resolved into the engine's receive continuation once a message
/// was serviced as a call. A distinguishing placeholder, not a protocol
/// fault: it only stops the engine's pass-through from interpreting the
/// message.
pub const CALL_INTERCEPTED: &str = "message was handled as a call, not as synchronization traffic";

/// What became of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Not a call; hand it to the engine unchanged.
    Forward,
    /// Serviced as a call — a correlated response (result or error) was
    /// sent, and the engine must not see the message.
    Intercepted,
}

impl ReceiveOutcome {
    /// Map onto the engine's receive continuation: forwarded messages let
    /// the engine proceed, intercepted ones short-circuit it with the
    /// [`CALL_INTERCEPTED`] placeholder.
    pub fn into_decision(self) -> Decision {
        match self {
            ReceiveOutcome::Forward => Decision::Allow,
            ReceiveOutcome::Intercepted => Decision::Deny(CALL_INTERCEPTED.to_string()),
        }
    }
}

/// A named operation exposed to clients over the call channel.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(&self, session: &SessionContext, args: &[Value]) -> Result<Value, CallError>;
}

/// Registry and dispatcher for call-shaped messages.
pub struct RpcMultiplexer {
    handlers: HashMap<String, Box<dyn CallHandler>>,
}

impl RpcMultiplexer {
    pub(crate) fn new(roles: Arc<dyn RoleResolver>) -> Self {
        let mut mux = Self {
            handlers: HashMap::new(),
        };
        mux.register("getIdentity", GetIdentity);
        mux.register("getRole", GetRole { roles });
        mux
    }

    /// Expose an additional named operation. A later registration for the
    /// same method replaces the earlier one.
    pub fn register(&mut self, method: impl Into<String>, handler: impl CallHandler + 'static) {
        self.handlers.insert(method.into(), Box::new(handler));
    }

    /// Classify one inbound message and, when it is a call, fully service
    /// it. Whether the call succeeds or fails, it is terminated here.
    pub async fn intercept(&self, session: &SessionContext, message: &Value) -> ReceiveOutcome {
        let Some(call) = CallRequest::from_message(message) else {
            return ReceiveOutcome::Forward;
        };
        debug!(
            "{}: call '{}' received ({})",
            session.identity(),
            call.method,
            call.correlation_id
        );

        if !session.begin_call(&call.correlation_id) {
            warn!(
                "{}: correlation id '{}' already outstanding",
                session.identity(),
                call.correlation_id
            );
            session.send_response(&CallResponse::err(
                call.correlation_id.as_str(),
                format!("correlation id '{}' already outstanding", call.correlation_id),
            ));
            return ReceiveOutcome::Intercepted;
        }

        let id = call.correlation_id.as_str();
        let response = match self.handlers.get(&call.method) {
            // Answering unknown methods explicitly keeps callers from
            // waiting forever on a response that will never come.
            None => CallResponse::err(
                id,
                GatewayError::UnknownCall(call.method.clone()).to_string(),
            ),
            Some(handler) => match handler.handle(session, &call.args).await {
                Ok(result) => CallResponse::ok(id, result),
                Err(e) => CallResponse::err(id, GatewayError::CallDispatch(e).to_string()),
            },
        };
        session.send_response(&response);
        session.finish_call(&call.correlation_id);
        ReceiveOutcome::Intercepted
    }
}

// ==================== Built-in Handlers ====================

/// `getIdentity()` — the identity bound to this connection.
struct GetIdentity;

#[async_trait]
impl CallHandler for GetIdentity {
    async fn handle(&self, session: &SessionContext, _args: &[Value]) -> Result<Value, CallError> {
        Ok(Value::String(session.identity().to_string()))
    }
}

/// `getRole(collection, name)` — the caller's current role for one
/// document, resolved live.
struct GetRole {
    roles: Arc<dyn RoleResolver>,
}

#[async_trait]
impl CallHandler for GetRole {
    async fn handle(&self, session: &SessionContext, args: &[Value]) -> Result<Value, CallError> {
        let collection = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CallError::InvalidArgs("expected (collection, name)".to_string()))?;
        let name = args
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| CallError::InvalidArgs("expected (collection, name)".to_string()))?;
        let doc = DocRef::new(collection, name);

        let role = if session.is_privileged() {
            Role::Owner
        } else {
            self.roles
                .resolve_role(session.identity(), &doc)
                .await
                .map_err(|e| CallError::Failed(e.to_string()))?
        };
        Ok(json!(role.level()))
    }
}
