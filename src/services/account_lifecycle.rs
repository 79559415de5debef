//! Account-deletion grace period sweep. A user's own `request_deletion` /
//! `cancel_deletion` calls only stamp or clear `deletion_requested_at`
//! (see `routes/account.rs`); this module is the periodic worker that
//! actually anonymizes accounts once their grace period has elapsed,
//! mirroring the recurring-expense sweep's pluggable-clock worker shape
//! so the 7-day boundary can be exercised in tests without sleeping.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::AppResult;

pub const GRACE_PERIOD_DAYS: i64 = 7;

/// Supplies "now" as a timestamp, pulled out of the sweep for testability.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub users_examined: u64,
    pub users_anonymized: u64,
}

/// Anonymizes every user whose `deletion_requested_at` is older than
/// `GRACE_PERIOD_DAYS` and who has not already been soft-deleted: clears
/// email and credentials, replaces the display name with a fixed
/// placeholder, and stamps `deleted_at`. Memberships, expenses, and
/// settlements are left untouched — they stay keyed by the now-anonymized
/// user id so historical balances remain correct, per the group/membership
/// ownership note in the data model.
pub async fn sweep(pool: &SqlitePool, clock: &dyn Clock) -> AppResult<SweepOutcome> {
    let mut outcome = SweepOutcome::default();
    let now = clock.now();
    let cutoff = (now - chrono::Duration::days(GRACE_PERIOD_DAYS)).to_rfc3339();

    let due: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM users
         WHERE deletion_requested_at IS NOT NULL
           AND deletion_requested_at <= ?
           AND deleted_at IS NULL",
    )
    .bind(&cutoff)
    .fetch_all(pool)
    .await?;

    outcome.users_examined = due.len() as u64;

    for (user_id,) in due {
        let now_str = now.to_rfc3339();
        let result = sqlx::query(
            "UPDATE users SET
                email = NULL,
                display_name = 'Deleted User',
                password_hash = '',
                user_state = 'revoked',
                token_version = token_version + 1,
                deleted_at = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now_str)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            outcome.users_anonymized += 1;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    async fn pool_with_schema() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn anonymizes_only_requests_past_grace_period() {
        let pool = pool_with_schema().await;
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let eight_days_ago = now - chrono::Duration::days(8);
        let one_day_ago = now - chrono::Duration::days(1);

        sqlx::query(
            "INSERT INTO users (username, password_hash, display_name, email, deletion_requested_at, created_at)
             VALUES ('alice', 'h', 'Alice', 'alice@example.com', ?, ?)",
        )
        .bind(eight_days_ago.to_rfc3339())
        .bind(eight_days_ago.to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO users (username, password_hash, display_name, email, deletion_requested_at, created_at)
             VALUES ('bob', 'h', 'Bob', 'bob@example.com', ?, ?)",
        )
        .bind(one_day_ago.to_rfc3339())
        .bind(one_day_ago.to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let clock = FixedClock(now);
        let outcome = sweep(&pool, &clock).await.unwrap();

        assert_eq!(outcome.users_anonymized, 1);

        let alice: (Option<String>, String, Option<String>) = sqlx::query_as(
            "SELECT email, display_name, deleted_at FROM users WHERE username = 'alice'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(alice.0, None);
        assert_eq!(alice.1, "Deleted User");
        assert!(alice.2.is_some());

        let bob: (Option<String>,) =
            sqlx::query_as("SELECT deleted_at FROM users WHERE username = 'bob'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(bob.0, None);
    }

    #[tokio::test]
    async fn cancelled_request_is_never_swept() {
        let pool = pool_with_schema().await;
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();

        sqlx::query(
            "INSERT INTO users (username, password_hash, display_name, email, deletion_requested_at, created_at)
             VALUES ('carol', 'h', 'Carol', 'carol@example.com', NULL, ?)",
        )
        .bind(now.to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let clock = FixedClock(now);
        let outcome = sweep(&pool, &clock).await.unwrap();
        assert_eq!(outcome.users_anonymized, 0);
    }

    #[tokio::test]
    async fn already_anonymized_user_is_not_reprocessed() {
        let pool = pool_with_schema().await;
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let old = now - chrono::Duration::days(30);

        sqlx::query(
            "INSERT INTO users (username, password_hash, display_name, email, deletion_requested_at, deleted_at, created_at)
             VALUES ('dave', '', 'Deleted User', NULL, ?, ?, ?)",
        )
        .bind(old.to_rfc3339())
        .bind(old.to_rfc3339())
        .bind(old.to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let clock = FixedClock(now);
        let outcome = sweep(&pool, &clock).await.unwrap();
        assert_eq!(outcome.users_examined, 0);
        assert_eq!(outcome.users_anonymized, 0);
    }
}
