//! # docgate
//!
//! Authorization gateway between concurrent real-time clients and a shared
//! mutable document store.
//!
//! This crate provides:
//! - **Hook pipeline**: fixed interception points around each stage of a
//!   document operation's life, consulting the role resolver before the
//!   synchronization engine may proceed
//! - **Role resolution**: the ordered role model and the meta/data path
//!   classifier, with pluggable backing logic
//! - **Call multiplexing**: request/response calls over the same transport
//!   the synchronization protocol uses, on both ends of the wire
//! - **Privileged context**: the gateway's own engine connection for
//!   administrative document provisioning
//! - **Transport wiring**: an axum WebSocket endpoint binding it together
//!
//! The operational-transform engine that merges concurrent edits is out of
//! scope and appears only behind the [`engine::SyncEngine`] trait.

pub mod client;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod protocol;
pub mod resolver;
pub mod roles;
pub mod root;
pub mod rpc;
pub mod server;
pub mod session;

pub use error::{CallError, EngineError, GatewayError, ResolverError};
pub use hooks::{Continuation, Decision, Gateway};
pub use roles::Role;
pub use session::{Identity, SessionContext};
