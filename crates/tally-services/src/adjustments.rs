//! Administrative adjustment service
//!
//! Grants and exact-balance resets. Corrections are always expressed as
//! new ledger rows, never as edits: a set-exact computes the single
//! compensating delta that reaches the target. Admin writes take the same
//! per-scope lock as charges, so a reset racing a concurrent charge cannot
//! miscount the resulting balance.

use sqlx::PgPool;
use std::sync::Arc;
use tally_core::{
    models::{LedgerEntryDraft, Scope, ScopeType},
    AppError, AppResult,
};
use tally_db::{scope_lock, PgLedgerRepository, PgMembershipRepository};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Applies administrative corrections through the ledger
pub struct AdjustmentService {
    pool: Arc<PgPool>,
    members: Arc<PgMembershipRepository>,
}

impl AdjustmentService {
    /// Create a new adjustment service
    pub fn new(pool: Arc<PgPool>, members: Arc<PgMembershipRepository>) -> Self {
        Self { pool, members }
    }

    /// Credit (or debit) a scope unconditionally
    ///
    /// Appends one ledger entry and returns the post-write balance.
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        scope: &Scope,
        delta: i64,
        reason: &str,
        actor_user_id: Option<Uuid>,
    ) -> AppResult<i64> {
        if delta == 0 {
            return Err(AppError::InvalidAdjustment(
                "grant delta must be non-zero".to_string(),
            ));
        }

        self.ensure_scope_exists(scope).await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!("Failed to start grant transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        scope_lock(&mut *tx, scope).await?;

        let draft = LedgerEntryDraft::new(*scope, delta, reason, actor_user_id);
        PgLedgerRepository::append_with(&mut *tx, &draft).await?;

        let new_balance = PgLedgerRepository::balance_with(&mut *tx, scope).await?;

        tx.commit().await.map_err(|e| {
            warn!("Failed to commit grant transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Granted {} credit(s) to {}: new balance {}",
            delta, scope, new_balance
        );

        Ok(new_balance)
    }

    /// Reset a scope to an exact balance
    ///
    /// Appends the single compensating entry that reaches the target, or
    /// nothing at all when the balance already matches (a zero-delta row
    /// is disallowed). Returns the resulting balance either way.
    #[instrument(skip(self))]
    pub async fn set_exact(
        &self,
        scope: &Scope,
        target_balance: i64,
        reason: &str,
        actor_user_id: Option<Uuid>,
    ) -> AppResult<i64> {
        self.ensure_scope_exists(scope).await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!("Failed to start set-exact transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // The lock is needed even for the no-op case: the diff decision
        // must observe a balance no concurrent charge can move.
        scope_lock(&mut *tx, scope).await?;

        let balance = PgLedgerRepository::balance_with(&mut *tx, scope).await?;
        let diff = target_balance - balance;

        if diff == 0 {
            info!("Balance of {} already {}; no entry written", scope, balance);
            return Ok(balance);
        }

        let draft = LedgerEntryDraft::new(*scope, diff, reason, actor_user_id);
        PgLedgerRepository::append_with(&mut *tx, &draft).await?;

        tx.commit().await.map_err(|e| {
            warn!("Failed to commit set-exact transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Reset {} from {} to {} (compensating delta {})",
            scope, balance, target_balance, diff
        );

        Ok(target_balance)
    }

    /// Admin operations must name a real org or user
    async fn ensure_scope_exists(&self, scope: &Scope) -> AppResult<()> {
        let exists = match scope.scope_type {
            ScopeType::Org => self.members.org_exists(scope.id).await?,
            ScopeType::User => self.members.user_exists(scope.id).await?,
        };

        if !exists {
            return Err(AppError::InvalidAdjustment(format!(
                "unknown {} scope: {}",
                scope.scope_type, scope.id
            )));
        }

        Ok(())
    }
}
