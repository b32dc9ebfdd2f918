//! Monthly window and cap enforcement
//!
//! Computes a user's consumption from an org pool within the current UTC
//! calendar month and compares it to the pair's optional cap. The cap is
//! a per-user attribution limit inside the shared pool, independent of how
//! much total balance the pool still holds.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tally_core::{models::CapStatus, traits::Clock, AppResult};
use tally_db::{PgLedgerRepository, PgMonthlyCapRepository};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Half-open UTC window `[month start, next month start)` containing `now`
pub fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = month_start(now.year(), now.month());
    let next = if now.month() == 12 {
        month_start(now.year() + 1, 1)
    } else {
        month_start(now.year(), now.month() + 1)
    };
    (start, next)
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    // Day 1 at midnight exists in every month.
    let date = NaiveDate::from_ymd_opt(year, month, 1).expect("first of month");
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight"))
}

/// Credits still available under a cap; `None` = unlimited
pub fn remaining(cap: Option<i64>, spent: i64) -> Option<i64> {
    cap.map(|cap| (cap - spent).max(0))
}

/// Evaluates monthly caps against recorded consumption
pub struct CapEnforcer {
    ledger: Arc<PgLedgerRepository>,
    caps: Arc<PgMonthlyCapRepository>,
    clock: Arc<dyn Clock>,
}

impl CapEnforcer {
    /// Create a new cap enforcer
    pub fn new(
        ledger: Arc<PgLedgerRepository>,
        caps: Arc<PgMonthlyCapRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            caps,
            clock,
        }
    }

    /// Credits the user consumed from the org pool this calendar month
    #[instrument(skip(self))]
    pub async fn spent_this_month(&self, org_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let (from, until) = month_window(self.clock.now());
        self.ledger
            .spent_in_window(org_id, user_id, from, until)
            .await
    }

    /// Credits still available to the user under the cap
    ///
    /// `None` when no active cap row exists or the row is unlimited.
    #[instrument(skip(self))]
    pub async fn remaining_cap(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Option<i64>> {
        Ok(self.cap_status(org_id, user_id).await?.remaining)
    }

    /// Full cap standing for the pair, for host dashboards
    #[instrument(skip(self))]
    pub async fn cap_status(&self, org_id: Uuid, user_id: Uuid) -> AppResult<CapStatus> {
        let cap = self
            .caps
            .find_active(org_id, user_id)
            .await?
            .and_then(|row| row.cap);

        let spent = self.spent_this_month(org_id, user_id).await?;

        debug!(
            "Cap status for user {} in org {}: cap={:?}, spent={}",
            user_id, org_id, cap, spent
        );

        Ok(CapStatus {
            cap,
            spent_this_month: spent,
            remaining: remaining(cap, spent),
        })
    }
}

/// In-transaction cap headroom for the charge path
///
/// Reads the active cap row and, only when a cap is set, the windowed
/// spend, all through the caller's transaction so the result is stable
/// under the scope lock.
pub(crate) async fn remaining_cap_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    clock: &dyn Clock,
    org_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<i64>> {
    let cap = PgMonthlyCapRepository::find_active_with(&mut **tx, org_id, user_id)
        .await?
        .and_then(|row| row.cap);

    match cap {
        Some(_) => {
            let (from, until) = month_window(clock.now());
            let spent =
                PgLedgerRepository::spent_in_window_with(&mut **tx, org_id, user_id, from, until)
                    .await?;
            Ok(remaining(cap, spent))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_month_window_mid_month() {
        let (from, until) = month_window(utc(2025, 6, 17, 13, 45, 12));
        assert_eq!(from, utc(2025, 6, 1, 0, 0, 0));
        assert_eq!(until, utc(2025, 7, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_window_first_instant_belongs_to_new_month() {
        let (from, until) = month_window(utc(2025, 3, 1, 0, 0, 0));
        assert_eq!(from, utc(2025, 3, 1, 0, 0, 0));
        assert_eq!(until, utc(2025, 4, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_window_december_wraps_year() {
        let (from, until) = month_window(utc(2025, 12, 31, 23, 59, 59));
        assert_eq!(from, utc(2025, 12, 1, 0, 0, 0));
        assert_eq!(until, utc(2026, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_window_leap_february() {
        let (from, until) = month_window(utc(2024, 2, 29, 12, 0, 0));
        assert_eq!(from, utc(2024, 2, 1, 0, 0, 0));
        assert_eq!(until, utc(2024, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_remaining_unlimited() {
        assert_eq!(remaining(None, 1_000), None);
    }

    #[test]
    fn test_remaining_clamped_at_zero() {
        assert_eq!(remaining(Some(5), 0), Some(5));
        assert_eq!(remaining(Some(5), 3), Some(2));
        assert_eq!(remaining(Some(5), 5), Some(0));
        // Overspend (e.g. cap lowered mid-month) never goes negative.
        assert_eq!(remaining(Some(5), 9), Some(0));
    }
}
