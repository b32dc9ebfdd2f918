//! Integration tests for the metering engine
//!
//! These run against a real PostgreSQL database. Set DATABASE_URL and run
//! with `cargo test -- --ignored`.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tally_metering::{
    AuthContext, ChargeOutcome, Clock, MeteringConfig, MeteringEngine, RejectionKind, Scope,
    SystemClock,
};
use uuid::Uuid;

/// Frozen time source for month-boundary tests
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

async fn engine_with_clock(clock: Arc<dyn Clock>) -> MeteringEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tally_metering=debug,tally_services=debug,sqlx=warn")
        .try_init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/tally_metering".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    let engine = MeteringEngine::with_pool(pool, clock, MeteringConfig::default());
    engine.migrate().await.expect("migrations failed");
    engine
}

async fn engine() -> MeteringEngine {
    engine_with_clock(Arc::new(SystemClock)).await
}

async fn create_org(engine: &MeteringEngine) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO orgs (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("org-{}", id))
        .execute(engine.pool())
        .await
        .expect("failed to create org");
    id
}

async fn create_user(engine: &MeteringEngine, org_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, org_id, email) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(org_id)
        .bind(format!("{}@example.com", id))
        .execute(engine.pool())
        .await
        .expect("failed to create user");
    id
}

#[tokio::test]
#[ignore] // Requires database
async fn test_charge_debits_org_pool() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let user = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);

    engine
        .grant_credits(&scope, 10, "initial topup", None)
        .await
        .unwrap();

    let outcome = engine
        .charge_for_operation(&AuthContext::member(user), 1, "polish")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChargeOutcome::Authorized {
            remaining_balance: 9
        }
    );
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 9);

    // One grant, one debit; the debit is attributed to the user.
    let entries = engine.list_ledger(&scope, None).await.unwrap();
    assert_eq!(entries.len(), 2);
    let debit = &entries[0];
    assert_eq!(debit.delta, -1);
    assert_eq!(debit.actor_user_id, Some(user));
    assert_eq!(debit.reason, "polish");

    // The usage event committed with the debit.
    let events = engine.list_usage_for_org(org, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, user);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_empty_pool_rejects_and_writes_nothing() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let user = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);

    let outcome = engine
        .charge_for_operation(&AuthContext::member(user), 1, "polish")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChargeOutcome::Rejected {
            kind: RejectionKind::InsufficientOrgCredits
        }
    );

    // Rejection purity: zero ledger entries, zero usage events.
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 0);
    assert!(engine.list_ledger(&scope, None).await.unwrap().is_empty());
    assert!(engine
        .list_usage_for_user(user, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_personal_balance_governs_solo_users() {
    let engine = engine().await;
    let user = create_user(&engine, None).await;
    let scope = Scope::user(user);

    engine
        .grant_credits(&scope, 2, "trial credits", None)
        .await
        .unwrap();

    let auth = AuthContext::member(user);

    let outcome = engine
        .charge_for_operation(&auth, 1, "polish")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ChargeOutcome::Authorized {
            remaining_balance: 1
        }
    );

    let outcome = engine
        .charge_for_operation(&auth, 2, "polish")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ChargeOutcome::Rejected {
            kind: RejectionKind::InsufficientUserCredits
        }
    );
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_cap_blocks_independently_of_pool_balance() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let user = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);
    let auth = AuthContext::member(user);

    engine
        .grant_credits(&scope, 100, "topup", None)
        .await
        .unwrap();
    engine.set_monthly_cap(org, user, Some(5)).await.unwrap();

    for _ in 0..5 {
        let outcome = engine
            .charge_for_operation(&auth, 1, "polish")
            .await
            .unwrap();
        assert!(outcome.is_authorized());
    }

    // Pool is far from empty, but the user's monthly headroom is gone.
    let outcome = engine
        .charge_for_operation(&auth, 1, "polish")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ChargeOutcome::Rejected {
            kind: RejectionKind::UserMonthlyCapReached
        }
    );
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 95);

    let status = engine.get_cap_status(org, user).await.unwrap();
    assert_eq!(status.cap, Some(5));
    assert_eq!(status.spent_this_month, 5);
    assert_eq!(status.remaining, Some(0));

    // An uncapped member of the same org is unaffected.
    let other = create_user(&engine, Some(org)).await;
    let outcome = engine
        .charge_for_operation(&AuthContext::member(other), 1, "polish")
        .await
        .unwrap();
    assert!(outcome.is_authorized());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_grant_tops_up_pool() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let scope = Scope::org(org);
    let admin = create_user(&engine, Some(org)).await;

    engine
        .grant_credits(&scope, 10, "initial", Some(admin))
        .await
        .unwrap();
    let new_balance = engine
        .grant_credits(&scope, 50, "topup", Some(admin))
        .await
        .unwrap();

    assert_eq!(new_balance, 60);
    assert_eq!(engine.list_ledger(&scope, None).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_set_exact_appends_single_compensating_entry() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let scope = Scope::org(org);

    engine
        .grant_credits(&scope, 35, "initial", None)
        .await
        .unwrap();

    let new_balance = engine
        .set_exact_balance(&scope, 20, "reset", None)
        .await
        .unwrap();
    assert_eq!(new_balance, 20);
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 20);

    let entries = engine.list_ledger(&scope, None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].delta, -15);

    // Already at target: no row appended.
    let new_balance = engine
        .set_exact_balance(&scope, 20, "reset", None)
        .await
        .unwrap();
    assert_eq!(new_balance, 20);
    assert_eq!(engine.list_ledger(&scope, None).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_charges_admit_exactly_one() {
    let engine = Arc::new(engine().await);
    let org = create_org(&engine).await;
    let user_a = create_user(&engine, Some(org)).await;
    let user_b = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);

    engine
        .grant_credits(&scope, 1, "single credit", None)
        .await
        .unwrap();

    let e1 = Arc::clone(&engine);
    let e2 = Arc::clone(&engine);
    let t1 = tokio::spawn(async move {
        e1.charge_for_operation(&AuthContext::member(user_a), 1, "polish")
            .await
            .unwrap()
    });
    let t2 = tokio::spawn(async move {
        e2.charge_for_operation(&AuthContext::member(user_b), 1, "polish")
            .await
            .unwrap()
    });

    let (r1, r2) = (t1.await.unwrap(), t2.await.unwrap());

    let authorized = [r1, r2].iter().filter(|o| o.is_authorized()).count();
    assert_eq!(authorized, 1, "exactly one of two racing charges may win");
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 0);

    // Sentinel: no scope anywhere has been driven negative.
    let overdrawn: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM (
            SELECT scope_type, scope_id
            FROM credit_ledger
            GROUP BY scope_type, scope_id
            HAVING SUM(delta) < 0
        ) AS negative_scopes
        "#,
    )
    .fetch_one(engine.pool())
    .await
    .unwrap();
    assert_eq!(overdrawn, 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_month_rollover_resets_spend() {
    let june = Utc.with_ymd_and_hms(2025, 6, 20, 10, 0, 0).unwrap();
    let engine = engine_with_clock(Arc::new(FixedClock(june))).await;
    let org = create_org(&engine).await;
    let user = create_user(&engine, Some(org)).await;
    let auth = AuthContext::member(user);

    engine
        .grant_credits(&Scope::org(org), 100, "topup", None)
        .await
        .unwrap();
    engine.set_monthly_cap(org, user, Some(5)).await.unwrap();

    for _ in 0..5 {
        assert!(engine
            .charge_for_operation(&auth, 1, "polish")
            .await
            .unwrap()
            .is_authorized());
    }
    assert_eq!(
        engine
            .charge_for_operation(&auth, 1, "polish")
            .await
            .unwrap(),
        ChargeOutcome::Rejected {
            kind: RejectionKind::UserMonthlyCapReached
        }
    );

    // Same ledger, next month: spend attribution starts over with no
    // admin action.
    let july = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 1).unwrap();
    let engine = {
        let pool = engine.pool().clone();
        MeteringEngine::with_pool(pool, Arc::new(FixedClock(july)), MeteringConfig::default())
    };

    let status = engine.get_cap_status(org, user).await.unwrap();
    assert_eq!(status.spent_this_month, 0);
    assert_eq!(status.remaining, Some(5));

    assert!(engine
        .charge_for_operation(&auth, 1, "polish")
        .await
        .unwrap()
        .is_authorized());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_admin_bypass_charges_nothing() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let admin = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);

    engine.grant_credits(&scope, 3, "topup", None).await.unwrap();

    let outcome = engine
        .charge_for_operation(&AuthContext::admin(admin), 1, "polish")
        .await
        .unwrap();

    // Authorized without debiting or recording anything.
    assert_eq!(
        outcome,
        ChargeOutcome::Authorized {
            remaining_balance: 3
        }
    );
    assert_eq!(engine.get_balance(&scope).await.unwrap(), 3);
    assert_eq!(engine.list_ledger(&scope, None).await.unwrap().len(), 1);
    assert!(engine
        .list_usage_for_user(admin, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_history_is_append_only() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let user = create_user(&engine, Some(org)).await;
    let scope = Scope::org(org);

    engine.grant_credits(&scope, 5, "topup", None).await.unwrap();

    let before = engine.list_ledger(&scope, None).await.unwrap();
    let first = before.last().unwrap().clone();

    engine
        .charge_for_operation(&AuthContext::member(user), 1, "polish")
        .await
        .unwrap();
    engine
        .set_exact_balance(&scope, 10, "correction", None)
        .await
        .unwrap();

    let after = engine.list_ledger(&scope, None).await.unwrap();
    assert!(after.len() > before.len());

    // The original entry is untouched by later operations.
    let still_first = after.last().unwrap();
    assert_eq!(still_first.id, first.id);
    assert_eq!(still_first.delta, first.delta);
    assert_eq!(still_first.reason, first.reason);
    assert_eq!(still_first.created_at, first.created_at);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_invalid_adjustments_are_refused() {
    let engine = engine().await;
    let org = create_org(&engine).await;
    let scope = Scope::org(org);

    let err = engine
        .grant_credits(&scope, 0, "noop", None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_adjustment");

    let err = engine
        .grant_credits(&Scope::org(Uuid::new_v4()), 10, "ghost", None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_adjustment");

    let err = engine
        .charge_for_operation(&AuthContext::member(Uuid::new_v4()), 1, "polish")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "user_not_found");
}
