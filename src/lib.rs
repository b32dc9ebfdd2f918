//! Tally Metering Engine
//!
//! Credit ledger and usage-accounting engine for the polish pipeline:
//! gates each paid operation behind available credit, which lives either
//! in an organization's shared pool or a user's personal balance,
//! optionally bounded by a per-user monthly cap within the org.
//!
//! The engine is a library consumed by the host application. Balances are
//! always derived from an append-only ledger; every writer serializes per
//! scope so concurrent charges cannot overdraw a pool.
//!
//! # Example
//!
//! ```no_run
//! use tally_metering::{AppConfig, AuthContext, MeteringEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let engine = MeteringEngine::connect(&config).await?;
//!     engine.migrate().await?;
//!
//!     let auth = AuthContext::member(uuid::Uuid::new_v4());
//!     let outcome = engine.charge_for_operation(&auth, 1, "polish").await?;
//!     println!("charge outcome: {:?}", outcome);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use tally_db::{
    create_pool, run_migrations, PgLedgerRepository, PgMembershipRepository,
    PgMonthlyCapRepository, PgUsageEventRepository,
};
use tally_services::{AdjustmentService, CapEnforcer, ChargeAuthorizer};

pub use tally_core::models::{
    AuthContext, CapStatus, LedgerEntry, LedgerEntryDraft, MonthlyCap, Scope, ScopeType,
    UsageEvent,
};
pub use tally_core::config::MeteringConfig;
pub use tally_core::traits::{ChargeOutcome, Clock, MembershipLookup, RejectionKind, SystemClock};
pub use tally_core::{AppConfig, AppError, AppResult};
pub use tally_services::month_window;

/// The metering engine facade
///
/// Wires the connection pool, repositories, and services together and
/// exposes the operations the host application calls.
pub struct MeteringEngine {
    pool: Arc<PgPool>,
    metering: MeteringConfig,
    ledger: Arc<PgLedgerRepository>,
    caps: Arc<PgMonthlyCapRepository>,
    usage: Arc<PgUsageEventRepository>,
    members: Arc<PgMembershipRepository>,
    authorizer: ChargeAuthorizer<PgMembershipRepository>,
    adjustments: AdjustmentService,
    enforcer: CapEnforcer,
}

impl MeteringEngine {
    /// Connect to the database described by the configuration
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let pool = create_pool(
            &config.database.url,
            Some(config.database.max_connections),
        )
        .await?;

        Ok(Self::with_pool(
            pool,
            Arc::new(SystemClock),
            config.metering.clone(),
        ))
    }

    /// Build the engine over an existing pool
    ///
    /// Hosts that manage their own pool, and tests that inject a fixed
    /// clock, construct the engine here.
    pub fn with_pool(pool: PgPool, clock: Arc<dyn Clock>, metering: MeteringConfig) -> Self {
        let pool = Arc::new(pool);
        let ledger = Arc::new(PgLedgerRepository::new((*pool).clone()));
        let caps = Arc::new(PgMonthlyCapRepository::new((*pool).clone()));
        let usage = Arc::new(PgUsageEventRepository::new((*pool).clone()));
        let members = Arc::new(PgMembershipRepository::new((*pool).clone()));

        let authorizer = ChargeAuthorizer::new(Arc::clone(&members), Arc::clone(&pool), Arc::clone(&clock));
        let adjustments = AdjustmentService::new(Arc::clone(&pool), Arc::clone(&members));
        let enforcer = CapEnforcer::new(Arc::clone(&ledger), Arc::clone(&caps), clock);

        Self {
            pool,
            metering,
            ledger,
            caps,
            usage,
            members,
            authorizer,
            adjustments,
            enforcer,
        }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> AppResult<()> {
        run_migrations(&self.pool).await
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Charging ====================

    /// Charge a user for one paid operation
    ///
    /// On `Authorized` the operation may proceed and the scope's ledger
    /// holds the debit; on `Rejected` nothing was written and the
    /// operation must not proceed. Storage errors also mean "do not
    /// proceed".
    #[instrument(skip(self, auth))]
    pub async fn charge_for_operation(
        &self,
        auth: &AuthContext,
        cost: i64,
        reason: &str,
    ) -> AppResult<ChargeOutcome> {
        self.authorizer.charge(auth, cost, reason).await
    }

    // ==================== Administration ====================

    /// Grant (or revoke) credits on a scope; returns the new balance
    #[instrument(skip(self))]
    pub async fn grant_credits(
        &self,
        scope: &Scope,
        delta: i64,
        reason: &str,
        actor_user_id: Option<Uuid>,
    ) -> AppResult<i64> {
        self.adjustments.grant(scope, delta, reason, actor_user_id).await
    }

    /// Reset a scope to an exact balance via one compensating entry
    #[instrument(skip(self))]
    pub async fn set_exact_balance(
        &self,
        scope: &Scope,
        target_balance: i64,
        reason: &str,
        actor_user_id: Option<Uuid>,
    ) -> AppResult<i64> {
        self.adjustments
            .set_exact(scope, target_balance, reason, actor_user_id)
            .await
    }

    /// Set or update a member's monthly cap within an org
    ///
    /// `cap = None` keeps the policy row but makes the member unlimited.
    #[instrument(skip(self))]
    pub async fn set_monthly_cap(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        cap: Option<i64>,
    ) -> AppResult<MonthlyCap> {
        if let Some(cap) = cap {
            if cap < 0 {
                return Err(AppError::InvalidAdjustment(format!(
                    "monthly cap must be non-negative, got {}",
                    cap
                )));
            }
        }

        if !self.members.org_exists(org_id).await? {
            return Err(AppError::OrgNotFound(org_id.to_string()));
        }
        if !self.members.user_exists(user_id).await? {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        self.caps.upsert(org_id, user_id, cap).await
    }

    /// Retire a member's monthly cap; returns false if none was active
    #[instrument(skip(self))]
    pub async fn remove_monthly_cap(&self, org_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        self.caps.deactivate(org_id, user_id).await
    }

    // ==================== Reads ====================

    /// Current balance of a scope (0 for a scope with no history)
    #[instrument(skip(self))]
    pub async fn get_balance(&self, scope: &Scope) -> AppResult<i64> {
        self.ledger.balance(scope).await
    }

    /// A member's cap standing for the current month
    #[instrument(skip(self))]
    pub async fn get_cap_status(&self, org_id: Uuid, user_id: Uuid) -> AppResult<CapStatus> {
        self.enforcer.cap_status(org_id, user_id).await
    }

    /// Read-only audit view of a scope's ledger, newest first
    #[instrument(skip(self))]
    pub async fn list_ledger(
        &self,
        scope: &Scope,
        limit: Option<i64>,
    ) -> AppResult<Vec<LedgerEntry>> {
        self.ledger
            .list(scope, self.metering.clamp_limit(limit))
            .await
    }

    /// Recent operations billed to an org, for dashboards
    #[instrument(skip(self))]
    pub async fn list_usage_for_org(
        &self,
        org_id: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<UsageEvent>> {
        self.usage
            .list_for_org(org_id, self.metering.clamp_limit(limit))
            .await
    }

    /// A user's recent operations, for dashboards
    #[instrument(skip(self))]
    pub async fn list_usage_for_user(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<UsageEvent>> {
        self.usage
            .list_for_user(user_id, self.metering.clamp_limit(limit))
            .await
    }
}
