//! Usage event repository implementation
//!
//! Write-once reporting log of completed paid operations. Recorded inside
//! the charge transaction, read only by dashboards; the authorization
//! path never consults it.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tally_core::{models::UsageEvent, AppError, AppResult};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of the usage event recorder
pub struct PgUsageEventRepository {
    pool: PgPool,
}

impl PgUsageEventRepository {
    /// Create a new usage event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one completed operation
    #[instrument(skip(self))]
    pub async fn record(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
        description: &str,
    ) -> AppResult<UsageEvent> {
        Self::record_with(&self.pool, user_id, org_id, description).await
    }

    /// Record within a caller-managed transaction
    ///
    /// The charge path uses this so the event commits or rolls back with
    /// its ledger entry.
    pub async fn record_with<'e, E: PgExecutor<'e>>(
        db: E,
        user_id: Uuid,
        org_id: Option<Uuid>,
        description: &str,
    ) -> AppResult<UsageEvent> {
        debug!("Recording usage event for user {}", user_id);

        let row = sqlx::query_as::<sqlx::Postgres, UsageRow>(
            r#"
            INSERT INTO usage_events (id, user_id, org_id, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, org_id, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(org_id)
        .bind(description)
        .fetch_one(db)
        .await
        .map_err(|e| {
            error!("Database error recording usage event: {}", e);
            AppError::Database(format!("Failed to record usage event: {}", e))
        })?;

        Ok(row.into())
    }

    /// A user's recent operations, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<UsageEvent>> {
        let rows = sqlx::query_as::<sqlx::Postgres, UsageRow>(
            r#"
            SELECT id, user_id, org_id, description, created_at
            FROM usage_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing usage for user {}: {}", user_id, e);
            AppError::Database(format!("Failed to list usage events: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// An organization's recent operations, newest first
    #[instrument(skip(self))]
    pub async fn list_for_org(&self, org_id: Uuid, limit: i64) -> AppResult<Vec<UsageEvent>> {
        let rows = sqlx::query_as::<sqlx::Postgres, UsageRow>(
            r#"
            SELECT id, user_id, org_id, description, created_at
            FROM usage_events
            WHERE org_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing usage for org {}: {}", org_id, e);
            AppError::Database(format!("Failed to list usage events: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Number of operations a user has completed
    #[instrument(skip(self))]
    pub async fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_events WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting usage for user {}: {}", user_id, e);
                AppError::Database(format!("Failed to count usage events: {}", e))
            })?;

        Ok(count)
    }

    /// Number of operations billed to an org since a point in time
    #[instrument(skip(self))]
    pub async fn count_for_org_since(&self, org_id: Uuid, from: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_events WHERE org_id = $1 AND created_at >= $2",
        )
        .bind(org_id)
        .bind(from)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting usage for org {}: {}", org_id, e);
            AppError::Database(format!("Failed to count usage events: {}", e))
        })?;

        Ok(count)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Option<Uuid>,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageEvent {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            description: row.description,
            created_at: row.created_at,
        }
    }
}
