//! Org membership repository implementation
//!
//! Reads membership off the host application's user records: a user's
//! nullable `org_id` fully determines scope resolution. Also provides the
//! existence checks the admin interface uses to validate scopes.

use async_trait::async_trait;
use sqlx::PgPool;
use tally_core::{traits::MembershipLookup, AppError, AppResult};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of org membership lookup
pub struct PgMembershipRepository {
    pool: PgPool,
}

impl PgMembershipRepository {
    /// Create a new membership repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether a user record exists
    #[instrument(skip(self))]
    pub async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error checking user {}: {}", user_id, e);
                AppError::Database(format!("Failed to check user: {}", e))
            })?;

        Ok(exists)
    }

    /// Whether an organization record exists
    #[instrument(skip(self))]
    pub async fn org_exists(&self, org_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orgs WHERE id = $1)")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error checking org {}: {}", org_id, e);
                AppError::Database(format!("Failed to check org: {}", e))
            })?;

        Ok(exists)
    }
}

#[async_trait]
impl MembershipLookup for PgMembershipRepository {
    #[instrument(skip(self))]
    async fn org_of(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        debug!("Resolving org membership for user {}", user_id);

        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT org_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error resolving membership for {}: {}", user_id, e);
                    AppError::Database(format!("Failed to resolve membership: {}", e))
                })?;

        match row {
            Some((org_id,)) => Ok(org_id),
            None => Err(AppError::UserNotFound(user_id.to_string())),
        }
    }
}
