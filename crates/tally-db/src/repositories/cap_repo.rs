//! Monthly cap repository implementation
//!
//! Provides PostgreSQL-backed storage for per-user monthly caps. Caps are
//! current policy rather than history, so unlike the ledger they are
//! mutated in place.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tally_core::{models::MonthlyCap, AppError, AppResult};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of the monthly cap store
pub struct PgMonthlyCapRepository {
    pool: PgPool,
}

impl PgMonthlyCapRepository {
    /// Create a new cap repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The active cap row for a (org, user) pair, if any
    #[instrument(skip(self))]
    pub async fn find_active(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Option<MonthlyCap>> {
        Self::find_active_with(&self.pool, org_id, user_id).await
    }

    /// Active cap lookup within a caller-managed transaction
    pub async fn find_active_with<'e, E: PgExecutor<'e>>(
        db: E,
        org_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<MonthlyCap>> {
        let row = sqlx::query_as::<sqlx::Postgres, CapRow>(
            r#"
            SELECT id, org_id, user_id, cap, active, created_at, updated_at
            FROM monthly_caps
            WHERE org_id = $1 AND user_id = $2 AND active
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(|e| {
            error!(
                "Database error finding cap for user {} in org {}: {}",
                user_id, org_id, e
            );
            AppError::Database(format!("Failed to find monthly cap: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    /// Create or update the active cap row for a (org, user) pair
    ///
    /// `cap = None` keeps the row but marks the user unlimited.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        cap: Option<i64>,
    ) -> AppResult<MonthlyCap> {
        debug!(
            "Upserting monthly cap for user {} in org {}: {:?}",
            user_id, org_id, cap
        );

        let row = sqlx::query_as::<sqlx::Postgres, CapRow>(
            r#"
            INSERT INTO monthly_caps (org_id, user_id, cap, active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (org_id, user_id) WHERE active
            DO UPDATE SET cap = EXCLUDED.cap, updated_at = now()
            RETURNING id, org_id, user_id, cap, active, created_at, updated_at
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(cap)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error upserting cap for user {} in org {}: {}",
                user_id, org_id, e
            );
            AppError::Database(format!("Failed to upsert monthly cap: {}", e))
        })?;

        Ok(row.into())
    }

    /// Retire the active cap row for a (org, user) pair
    ///
    /// Returns false when no active row existed.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, org_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        debug!(
            "Deactivating monthly cap for user {} in org {}",
            user_id, org_id
        );

        let result = sqlx::query(
            r#"
            UPDATE monthly_caps
            SET active = FALSE, updated_at = now()
            WHERE org_id = $1 AND user_id = $2 AND active
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error deactivating cap for user {} in org {}: {}",
                user_id, org_id, e
            );
            AppError::Database(format!("Failed to deactivate monthly cap: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CapRow {
    id: i64,
    org_id: Uuid,
    user_id: Uuid,
    cap: Option<i64>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CapRow> for MonthlyCap {
    fn from(row: CapRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            user_id: row.user_id,
            cap: row.cap,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
