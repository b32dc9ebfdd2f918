//! Credit ledger repository implementation
//!
//! Provides PostgreSQL-backed storage for the append-only credit ledger.
//! Balances are derived with SUM(delta) per scope; no balance column
//! exists anywhere. Operations that must participate in a caller's
//! transaction are exposed as `*_with` associated functions taking any
//! `PgExecutor`.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tally_core::{
    models::{LedgerEntry, LedgerEntryDraft, Scope},
    AppError, AppResult,
};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::parse_scope_type;

/// Serialize writers on a scope for the duration of the transaction
///
/// Takes a transaction-scoped advisory lock keyed by `scope_type:scope_id`.
/// Every check-then-append sequence (charge, grant, set-exact) must call
/// this first, on its own transaction; the lock is released at
/// commit/rollback. Readers never take it.
pub async fn scope_lock<'e, E: PgExecutor<'e>>(db: E, scope: &Scope) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(scope.lock_key())
        .execute(db)
        .await
        .map_err(|e| {
            error!("Failed to lock scope {}: {}", scope, e);
            AppError::Database(format!("Failed to lock scope: {}", e))
        })?;

    Ok(())
}

/// PostgreSQL implementation of the ledger store
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one immutable entry
    ///
    /// The only write this store supports. No row is ever updated or
    /// deleted.
    #[instrument(skip(self, draft))]
    pub async fn append(&self, draft: &LedgerEntryDraft) -> AppResult<LedgerEntry> {
        Self::append_with(&self.pool, draft).await
    }

    /// Append within a caller-managed transaction
    pub async fn append_with<'e, E: PgExecutor<'e>>(
        db: E,
        draft: &LedgerEntryDraft,
    ) -> AppResult<LedgerEntry> {
        draft.validate()?;

        debug!(
            "Appending ledger entry: scope={}, delta={}, reason={}",
            draft.scope, draft.delta, draft.reason
        );

        let row = sqlx::query_as::<sqlx::Postgres, LedgerRow>(
            r#"
            INSERT INTO credit_ledger (scope_type, scope_id, delta, reason, actor_user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, scope_type, scope_id, delta, reason, actor_user_id, created_at
            "#,
        )
        .bind(draft.scope.scope_type.as_str())
        .bind(draft.scope.id)
        .bind(draft.delta)
        .bind(&draft.reason)
        .bind(draft.actor_user_id)
        .fetch_one(db)
        .await
        .map_err(|e| {
            error!("Database error appending ledger entry: {}", e);
            AppError::Database(format!("Failed to append ledger entry: {}", e))
        })?;

        Ok(row.into())
    }

    /// Current balance of a scope: SUM(delta) over all its entries
    ///
    /// Returns 0 for a scope with no entries.
    #[instrument(skip(self))]
    pub async fn balance(&self, scope: &Scope) -> AppResult<i64> {
        Self::balance_with(&self.pool, scope).await
    }

    /// Balance within a caller-managed transaction
    pub async fn balance_with<'e, E: PgExecutor<'e>>(db: E, scope: &Scope) -> AppResult<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(delta), 0)::BIGINT
            FROM credit_ledger
            WHERE scope_type = $1 AND scope_id = $2
            "#,
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.id)
        .fetch_one(db)
        .await
        .map_err(|e| {
            error!("Database error computing balance for {}: {}", scope, e);
            AppError::Database(format!("Failed to compute balance: {}", e))
        })?;

        Ok(balance)
    }

    /// Credits a user consumed from an org pool within `[from, until)`
    ///
    /// Sums debit entries on the org scope attributed to the user and
    /// negates the result, so the returned spend is non-negative.
    #[instrument(skip(self))]
    pub async fn spent_in_window(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<i64> {
        Self::spent_in_window_with(&self.pool, org_id, user_id, from, until).await
    }

    /// Windowed spend within a caller-managed transaction
    pub async fn spent_in_window_with<'e, E: PgExecutor<'e>>(
        db: E,
        org_id: Uuid,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<i64> {
        let spent: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(-SUM(delta), 0)::BIGINT
            FROM credit_ledger
            WHERE scope_type = 'org'
              AND scope_id = $1
              AND actor_user_id = $2
              AND delta < 0
              AND created_at >= $3
              AND created_at < $4
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_one(db)
        .await
        .map_err(|e| {
            error!(
                "Database error computing monthly spend for user {} in org {}: {}",
                user_id, org_id, e
            );
            AppError::Database(format!("Failed to compute monthly spend: {}", e))
        })?;

        Ok(spent)
    }

    /// Read-only audit view of a scope's history, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, scope: &Scope, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        debug!("Listing ledger entries for {} (limit {})", scope, limit);

        let rows = sqlx::query_as::<sqlx::Postgres, LedgerRow>(
            r#"
            SELECT id, scope_type, scope_id, delta, reason, actor_user_id, created_at
            FROM credit_ledger
            WHERE scope_type = $1 AND scope_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing ledger for {}: {}", scope, e);
            AppError::Database(format!("Failed to list ledger entries: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Number of entries recorded for a scope
    #[instrument(skip(self))]
    pub async fn count(&self, scope: &Scope) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credit_ledger WHERE scope_type = $1 AND scope_id = $2",
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting ledger entries: {}", e);
            AppError::Database(format!("Failed to count ledger entries: {}", e))
        })?;

        Ok(count)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    scope_type: String,
    scope_id: Uuid,
    delta: i64,
    reason: String,
    actor_user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            scope: Scope {
                scope_type: parse_scope_type(&row.scope_type),
                id: row.scope_id,
            },
            id: row.id,
            delta: row.delta,
            reason: row.reason,
            actor_user_id: row.actor_user_id,
            created_at: row.created_at,
        }
    }
}
