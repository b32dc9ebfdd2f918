//! Charge authorization service
//!
//! The check-then-debit core of the engine. A charge resolves its scope,
//! then runs both affordability checks and the debit append inside one
//! transaction holding the scope's advisory lock, so concurrent charges on
//! the same scope serialize: a pool with exactly one credit left admits
//! exactly one of two simultaneous cost-1 charges.
//!
//! Flow per charge:
//! - resolve scope (org membership wins)
//! - admin bypass: authorized, nothing written
//! - lock scope, check pool balance, then the caller's monthly cap
//! - authorized: debit entry + usage event in the same transaction
//! - rejected: transaction dropped, nothing written

use crate::caps::remaining_cap_in_tx;
use crate::scope::ScopeResolver;
use sqlx::PgPool;
use std::sync::Arc;
use tally_core::{
    models::{AuthContext, LedgerEntryDraft, ScopeType},
    traits::{ChargeOutcome, Clock, MembershipLookup, RejectionKind},
    AppError, AppResult,
};
use tally_db::{scope_lock, PgLedgerRepository, PgUsageEventRepository};
use tracing::{info, instrument, warn};

/// Authorizes and records charges for paid operations
pub struct ChargeAuthorizer<M: MembershipLookup> {
    resolver: ScopeResolver<M>,
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
}

/// Affordability decision for a charge already holding the scope lock
///
/// Pool balance is checked before the caller's cap, so an empty pool
/// reports as such even when the cap is also exhausted.
fn evaluate(
    scope_type: ScopeType,
    balance: i64,
    remaining_cap: Option<i64>,
    cost: i64,
) -> Option<RejectionKind> {
    if balance < cost {
        return Some(match scope_type {
            ScopeType::Org => RejectionKind::InsufficientOrgCredits,
            ScopeType::User => RejectionKind::InsufficientUserCredits,
        });
    }

    if let Some(remaining) = remaining_cap {
        if remaining < cost {
            return Some(RejectionKind::UserMonthlyCapReached);
        }
    }

    None
}

impl<M: MembershipLookup> ChargeAuthorizer<M> {
    /// Create a new charge authorizer
    pub fn new(members: Arc<M>, pool: Arc<PgPool>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver: ScopeResolver::new(members),
            pool,
            clock,
        }
    }

    /// Charge a user for one paid operation
    ///
    /// Returns `Authorized` with the scope's post-debit balance, or
    /// `Rejected` with the specific refusal. A storage failure means the
    /// charge did not happen and the gated operation must not proceed.
    #[instrument(skip(self, auth), fields(user_id = %auth.user_id))]
    pub async fn charge(
        &self,
        auth: &AuthContext,
        cost: i64,
        reason: &str,
    ) -> AppResult<ChargeOutcome> {
        if cost <= 0 {
            return Err(AppError::InvalidAdjustment(format!(
                "charge cost must be positive, got {}",
                cost
            )));
        }

        let scope = self.resolver.resolve(auth.user_id).await?;

        // Admin operations are free and untracked: no ledger write at all.
        if auth.is_admin_bypass {
            let balance = PgLedgerRepository::balance_with(&*self.pool, &scope).await?;
            info!(
                "Admin bypass for user {} on {}; nothing charged",
                auth.user_id, scope
            );
            return Ok(ChargeOutcome::Authorized {
                remaining_balance: balance,
            });
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!("Failed to start charge transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Single writer per scope from here until commit/rollback.
        scope_lock(&mut *tx, &scope).await?;

        let balance = PgLedgerRepository::balance_with(&mut *tx, &scope).await?;

        let remaining_cap = match scope.scope_type {
            ScopeType::Org => {
                remaining_cap_in_tx(&mut tx, self.clock.as_ref(), scope.id, auth.user_id).await?
            }
            ScopeType::User => None,
        };

        if let Some(kind) = evaluate(scope.scope_type, balance, remaining_cap, cost) {
            warn!(
                "Charge rejected for user {} on {}: {} (balance={}, cap_remaining={:?}, cost={})",
                auth.user_id, scope, kind, balance, remaining_cap, cost
            );
            // Dropping the transaction rolls back; nothing was written.
            return Ok(ChargeOutcome::Rejected { kind });
        }

        let draft = LedgerEntryDraft::new(scope, -cost, reason, Some(auth.user_id));
        PgLedgerRepository::append_with(&mut *tx, &draft).await?;

        let org_id = match scope.scope_type {
            ScopeType::Org => Some(scope.id),
            ScopeType::User => None,
        };
        PgUsageEventRepository::record_with(&mut *tx, auth.user_id, org_id, reason).await?;

        tx.commit().await.map_err(|e| {
            warn!("Failed to commit charge transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        let remaining_balance = balance - cost;

        info!(
            "Charged user {} {} credit(s) on {}: remaining balance {}",
            auth.user_id, cost, scope, remaining_balance
        );

        Ok(ChargeOutcome::Authorized { remaining_balance })
    }
}
