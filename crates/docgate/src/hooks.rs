//! The authorization hook pipeline.
//!
//! One entry point per lifecycle stage the synchronization engine raises,
//! invoked in submission order per connection. Each stage resolves to
//! [`Decision::Allow`] or [`Decision::Deny`]; denials carry the reason the
//! engine relays back to the submitting client. Role checks suspend on the
//! [`RoleResolver`] and never panic the pipeline.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::error::{EngineError, GatewayError};
use crate::protocol::{DocOperation, DocRef};
use crate::resolver::{AnonymousIdentity, IdentityResolver, OpenAccess, RoleResolver};
use crate::roles::{Role, required_for_edits};
use crate::root::PrivilegedContext;
use crate::rpc::{CallHandler, ReceiveOutcome, RpcMultiplexer};
use crate::session::{ConnectionRegistry, Identity, Outbound, SessionContext};

// ==================== Decisions & Continuations ====================

/// Outcome of one hook stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the engine proceed unchanged.
    Allow,
    /// Fail the operation; the engine surfaces the reason to the client.
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), GatewayError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(GatewayError::AuthorizationDenied(reason)),
        }
    }
}

/// Single-shot continuation handed in by the engine.
///
/// Invoked exactly once: with `None` to allow, `Some(reason)` to deny.
/// Resolving an abandoned continuation — its connection closed while a role
/// lookup was in flight — is a no-op.
pub struct Continuation {
    inner: Mutex<Option<Box<dyn FnOnce(Option<String>) + Send>>>,
}

impl Continuation {
    pub fn new(done: impl FnOnce(Option<String>) + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(done))),
        }
    }

    pub fn resolve(&self, decision: Decision) {
        let Some(done) = self.inner.lock().unwrap().take() else {
            return;
        };
        match decision {
            Decision::Allow => done(None),
            Decision::Deny(reason) => done(Some(reason)),
        }
    }

    /// Drop the callback without invoking it; later resolves are no-ops.
    pub fn abandon(&self) {
        self.inner.lock().unwrap().take();
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.lock().unwrap().is_none()
    }
}

// ==================== Stage Payloads ====================

/// Connection-establishment metadata for the connect stage.
pub struct ConnectRequest<'a> {
    /// Credential material extracted from connection establishment (e.g.
    /// the `auth` query parameter); absent for unauthenticated connections.
    pub credentials: Option<&'a str>,
    /// Sender for frames addressed back to this client.
    pub outbound: Option<Outbound>,
}

/// A snapshot about to be revealed to the requester.
pub struct DocRequest<'a> {
    pub session: &'a SessionContext,
    pub doc: &'a DocRef,
}

/// An operation moving through the submit, apply and commit stages.
pub struct OpRequest<'a> {
    pub session: &'a SessionContext,
    pub doc: &'a DocRef,
    pub op: &'a DocOperation,
}

/// A query about to be issued against a collection.
pub struct QueryRequest<'a> {
    pub session: &'a SessionContext,
    pub collection: &'a str,
}

/// An inbound message offered to the multiplexer before the engine.
pub struct ReceiveRequest<'a> {
    pub session: &'a SessionContext,
    pub message: &'a serde_json::Value,
}

/// A lifecycle stage raised by the engine, paired with its payload, for
/// continuation-style dispatch.
pub enum HookEvent<'a> {
    OpLoaded(OpRequest<'a>),
    DocLoaded(DocRequest<'a>),
    Query(QueryRequest<'a>),
    BeforeSubmit(OpRequest<'a>),
    Apply(OpRequest<'a>),
    Commit(OpRequest<'a>),
    AfterSubmit(OpRequest<'a>),
}

enum Permission {
    Read,
    Write,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => write!(f, "Read"),
            Permission::Write => write!(f, "Write"),
        }
    }
}

// ==================== Gateway ====================

/// The authorization gateway: connection registry, hook pipeline, call
/// multiplexer and privileged context around one synchronization engine.
pub struct Gateway {
    registry: ConnectionRegistry,
    identities: Arc<dyn IdentityResolver>,
    roles: Arc<dyn RoleResolver>,
    rpc: RpcMultiplexer,
    engine: Arc<dyn SyncEngine>,
    root: PrivilegedContext,
}

impl Gateway {
    /// Build a gateway over an engine with explicit collaborators.
    pub fn new(
        engine: Arc<dyn SyncEngine>,
        identities: Arc<dyn IdentityResolver>,
        roles: Arc<dyn RoleResolver>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let root = PrivilegedContext::new(&registry);
        let rpc = RpcMultiplexer::new(roles.clone());
        Self {
            registry,
            identities,
            roles,
            rpc,
            engine,
            root,
        }
    }

    /// Gateway with the open-by-default collaborators: anonymous identities
    /// and owner-of-everything roles.
    pub fn with_defaults(engine: Arc<dyn SyncEngine>) -> Self {
        Self::new(engine, Arc::new(AnonymousIdentity), Arc::new(OpenAccess))
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The privileged context used for administrative provisioning.
    pub fn root(&self) -> &PrivilegedContext {
        &self.root
    }

    /// Expose an additional call method to clients.
    pub fn register_call(&mut self, method: impl Into<String>, handler: impl CallHandler + 'static) {
        self.rpc.register(method, handler);
    }

    /// Establish the gateway's own engine connection. Administrative
    /// provisioning through [`Gateway::root`] is invalid until this returns.
    pub async fn connect_root(&self) -> Result<(), EngineError> {
        self.root.connect(self.engine.as_ref()).await
    }

    // ==================== Lifecycle Stages ====================

    /// connect: always proceeds. Resolver failure or an unresolvable
    /// credential downgrades the connection to the anonymous identity.
    pub async fn on_connect(&self, req: ConnectRequest<'_>) -> Arc<SessionContext> {
        let identity = match self.identities.resolve_identity(req.credentials).await {
            Ok(Some(identity)) => identity,
            Ok(None) => Identity::anonymous(),
            Err(e) => {
                warn!(
                    "{}; continuing as anonymous",
                    GatewayError::IdentityResolution(e)
                );
                Identity::anonymous()
            }
        };
        let session = Arc::new(SessionContext::new(identity, false, req.outbound));
        self.registry.insert(session.clone());
        info!(
            "{}: connected with connection id {}",
            session.identity(),
            session.connection_id()
        );
        session
    }

    /// Tear down a connection: unregister it and abandon anything still in
    /// flight for it.
    pub fn on_disconnect(&self, session: &SessionContext) {
        self.registry.close(&session.connection_id());
        info!(
            "{}: disconnected ({})",
            session.identity(),
            session.connection_id()
        );
    }

    /// op-loaded: an operation was loaded from the engine. Observation
    /// point only.
    pub async fn on_op_loaded(&self, req: OpRequest<'_>) -> Decision {
        debug!(
            "{}: operation loaded for {}",
            req.session.identity(),
            req.doc
        );
        Decision::Allow
    }

    /// doc-loaded: a snapshot is about to be revealed to the requester.
    pub async fn on_doc_loaded(&self, req: DocRequest<'_>) -> Decision {
        self.assert_role(req.session, Role::Reader, req.doc, Permission::Read)
            .await
    }

    /// query-issued: a query is about to be sent to the engine's backend.
    /// Observation point only.
    pub async fn on_query(&self, req: QueryRequest<'_>) -> Decision {
        debug!(
            "{}: query issued against collection {}",
            req.session.identity(),
            req.collection
        );
        Decision::Allow
    }

    /// before-submit: an operation is about to enter the engine.
    /// Observation point only.
    pub async fn before_submit(&self, req: OpRequest<'_>) -> Decision {
        debug!(
            "{}: operation submitted for {}",
            req.session.identity(),
            req.doc
        );
        Decision::Allow
    }

    /// apply: an operation is about to mutate an in-memory snapshot.
    /// Whole-document create and delete require ownership here; ordinary
    /// edits pass and are path-checked at commit, once the individual
    /// sub-edits are known.
    pub async fn on_apply(&self, req: OpRequest<'_>) -> Decision {
        if !req.op.is_structural() {
            return Decision::Allow;
        }
        self.assert_role(req.session, Role::Owner, req.doc, Permission::Write)
            .await
    }

    /// commit: operation and new snapshot are about to be persisted.
    /// Create and delete were already checked at apply. An edit batch needs
    /// the writer role, elevated to owner when any sub-edit targets a meta
    /// path — one such edit decides for the entire batch.
    pub async fn on_commit(&self, req: OpRequest<'_>) -> Decision {
        let edits = match req.op {
            DocOperation::Edit { edits } => edits,
            _ => return Decision::Allow,
        };
        let required = required_for_edits(edits);
        self.assert_role(req.session, required, req.doc, Permission::Write)
            .await
    }

    /// after-submit: the operation was accepted by the engine. Observation
    /// point only.
    pub async fn after_submit(&self, req: OpRequest<'_>) -> Decision {
        debug!(
            "{}: operation committed for {}",
            req.session.identity(),
            req.doc
        );
        Decision::Allow
    }

    /// receive: offer the message to the multiplexer first; traffic without
    /// a correlation id goes to the engine unchanged.
    pub async fn on_receive(&self, req: ReceiveRequest<'_>) -> ReceiveOutcome {
        let outcome = self.rpc.intercept(req.session, req.message).await;
        if outcome == ReceiveOutcome::Forward
            && let Err(e) = self
                .engine
                .receive(req.session, req.message.clone())
                .await
        {
            // Engine-side receive failures are the engine's to surface.
            warn!(
                "engine receive failed for {}: {}",
                req.session.connection_id(),
                e
            );
        }
        outcome
    }

    /// Adapter from the async stages onto the engine's single-shot
    /// continuation contract. The caller must not raise stage N+1 of an
    /// operation before stage N has resolved.
    pub async fn dispatch(&self, event: HookEvent<'_>, done: &Continuation) {
        let decision = match event {
            HookEvent::OpLoaded(req) => self.on_op_loaded(req).await,
            HookEvent::DocLoaded(req) => self.on_doc_loaded(req).await,
            HookEvent::Query(req) => self.on_query(req).await,
            HookEvent::BeforeSubmit(req) => self.before_submit(req).await,
            HookEvent::Apply(req) => self.on_apply(req).await,
            HookEvent::Commit(req) => self.on_commit(req).await,
            HookEvent::AfterSubmit(req) => self.after_submit(req).await,
        };
        done.resolve(decision);
    }

    /// One authorization check: privileged sessions bypass, everyone else
    /// gets a live role resolution compared against the stage's
    /// requirement. Failures resolve to a denial, never a panic.
    async fn assert_role(
        &self,
        session: &SessionContext,
        required: Role,
        doc: &DocRef,
        permission: Permission,
    ) -> Decision {
        if session.is_privileged() {
            return Decision::Allow;
        }
        match self.roles.resolve_role(session.identity(), doc).await {
            Ok(role) if role >= required => {
                debug!(
                    "{}: {} permission granted for {} (role {})",
                    session.identity(),
                    permission,
                    doc,
                    role
                );
                Decision::Allow
            }
            Ok(role) => {
                debug!(
                    "{}: {} permission denied for {} (role {}, required {})",
                    session.identity(),
                    permission,
                    doc,
                    role,
                    required
                );
                Decision::Deny(format!(
                    "{} permission denied for {} to user '{}'",
                    permission,
                    doc,
                    session.identity()
                ))
            }
            Err(e) => Decision::Deny(format!(
                "role resolution failed for user '{}' on {}: {}",
                session.identity(),
                doc,
                e
            )),
        }
    }
}
