//! Scope resolution service
//!
//! Decides which billing scope governs a user's charges. Membership wins
//! unconditionally: a user who belongs to an org never charges a personal
//! balance, even if vestigial personal ledger rows exist for them.

use std::sync::Arc;
use tally_core::{models::Scope, traits::MembershipLookup, AppResult};
use tracing::debug;
use uuid::Uuid;

/// Resolves users to the scope their charges apply to
pub struct ScopeResolver<M: MembershipLookup> {
    members: Arc<M>,
}

impl<M: MembershipLookup> ScopeResolver<M> {
    /// Create a new scope resolver
    pub fn new(members: Arc<M>) -> Self {
        Self { members }
    }

    /// The billing scope for a user's charges
    pub async fn resolve(&self, user_id: Uuid) -> AppResult<Scope> {
        let scope = match self.members.org_of(user_id).await? {
            Some(org_id) => Scope::org(org_id),
            None => Scope::user(user_id),
        };

        debug!("Resolved user {} to scope {}", user_id, scope);

        Ok(scope)
    }
}
