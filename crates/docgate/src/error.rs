//! Error taxonomy for the gateway.
//!
//! Nothing in this layer is process-fatal: authorization failures surface as
//! operation denials, identity-resolution failures downgrade the connection
//! to the anonymous identity, and call failures travel back to the caller on
//! the response channel while the connection stays open.

use thiserror::Error;

/// Failure reported by a pluggable identity or role resolver.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ResolverError(pub String);

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure raised while servicing a call.
#[derive(Debug, Error)]
pub enum CallError {
    /// The call's arguments did not match the handler's signature.
    #[error("invalid call arguments: {0}")]
    InvalidArgs(String),
    /// The handler itself rejected the call.
    #[error("{0}")]
    Failed(String),
}

/// Failure at the synchronization-engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The gateway's own engine connection has not completed its handshake.
    #[error("gateway connection to the engine is not established")]
    NotConnected,
    /// The engine reported a backend failure.
    #[error("engine backend error: {0}")]
    Backend(String),
}

/// Top-level gateway error.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Role insufficient for the requested operation or path. Relayed to the
    /// client as the operation's failure reason, never as a transport error.
    #[error("{0}")]
    AuthorizationDenied(String),
    /// Credential resolution failed; the connection continues anonymously.
    #[error("identity resolution failed: {0}")]
    IdentityResolution(#[source] ResolverError),
    /// A call handler rejected the call.
    #[error("call dispatch failed: {0}")]
    CallDispatch(#[source] CallError),
    /// A call named a method no handler services.
    #[error("unknown call method '{0}'")]
    UnknownCall(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
