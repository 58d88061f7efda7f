//! Pluggable identity and role resolution.
//!
//! The embedder supplies the backing logic — an ACL lookup, a user table —
//! behind these traits. The gateway contributes only the ordering semantics
//! of [`Role`] and the meta/data path classifier. A role lookup must be
//! deterministic for a given (identity, document) at a given instant, but is
//! allowed to change over time; results are therefore never cached across
//! operations.

use async_trait::async_trait;

use crate::error::ResolverError;
use crate::protocol::DocRef;
use crate::roles::Role;
use crate::session::Identity;

/// Resolves connection-establishment credentials into an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` and `Err` both downgrade the connection to the anonymous
    /// identity — an unauthenticated connection is allowed to exist, with
    /// minimal role.
    async fn resolve_identity(
        &self,
        credentials: Option<&str>,
    ) -> Result<Option<Identity>, ResolverError>;
}

/// Resolves the acting identity's current role for one document.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve_role(&self, identity: &Identity, doc: &DocRef) -> Result<Role, ResolverError>;
}

/// Default identity resolver: every connection is anonymous.
pub struct AnonymousIdentity;

#[async_trait]
impl IdentityResolver for AnonymousIdentity {
    async fn resolve_identity(
        &self,
        _credentials: Option<&str>,
    ) -> Result<Option<Identity>, ResolverError> {
        Ok(None)
    }
}

/// Default role resolver: every identity owns every document. Open by
/// default, matching an unconfigured deployment.
pub struct OpenAccess;

#[async_trait]
impl RoleResolver for OpenAccess {
    async fn resolve_role(
        &self,
        _identity: &Identity,
        _doc: &DocRef,
    ) -> Result<Role, ResolverError> {
        Ok(Role::Owner)
    }
}
