use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, AppResult, ErrorSource};
use crate::middleware::AuthUser;
use crate::models::EventRole;
use crate::store::Store;

/// Named permission checked against a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    IsAdmin,
    IsSuperAdmin,
    IsOrganizer,
    IsCoorganizer,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::IsAdmin => "is_admin",
            Capability::IsSuperAdmin => "is_super_admin",
            Capability::IsOrganizer => "is_organizer",
            Capability::IsCoorganizer => "is_coorganizer",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    Global,
    Event(i64),
}

#[async_trait]
pub trait AccessPolicy: Send + Sync + 'static {
    async fn has_access(&self, user: &AuthUser, capability: Capability, scope: AccessScope) -> AppResult<bool>;
}

/// Role lookups against the users and users_events_roles tables.
///
/// Staff (admin or super admin) pass every event-scoped check; an
/// organizer also counts as a co-organizer. Event capabilities asked
/// without an event scope are denied.
pub struct StoreAccessPolicy {
    store: Arc<dyn Store>,
}

impl StoreAccessPolicy {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessPolicy for StoreAccessPolicy {
    async fn has_access(&self, user: &AuthUser, capability: Capability, scope: AccessScope) -> AppResult<bool> {
        let allowed = match (capability, scope) {
            (Capability::IsSuperAdmin, _) => user.is_super_admin,
            (Capability::IsAdmin, _) => user.is_staff(),
            (_, AccessScope::Global) => false,
            (_, AccessScope::Event(_)) if user.is_staff() => true,
            (Capability::IsOrganizer, AccessScope::Event(event_id)) => {
                self.store.event_role(user.user_id, event_id).await? == Some(EventRole::Organizer)
            }
            (Capability::IsCoorganizer, AccessScope::Event(event_id)) => {
                self.store.event_role(user.user_id, event_id).await?.is_some()
            }
        };

        tracing::debug!(user_id = user.user_id, %capability, ?scope, allowed, "access check");
        Ok(allowed)
    }
}

/// Fails with 403 and `detail` unless the check passes.
pub async fn require(
    policy: &dyn AccessPolicy,
    user: &AuthUser,
    capability: Capability,
    scope: AccessScope,
    source: ErrorSource,
    detail: &str,
) -> AppResult<()> {
    if policy.has_access(user, capability, scope).await? {
        Ok(())
    } else {
        Err(AppError::forbidden(source, detail))
    }
}
