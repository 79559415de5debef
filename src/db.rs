use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    ConnectOptions, SqlitePool,
};
use std::{path::Path, str::FromStr, time::Duration};

pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    // Extract path from sqlite: URL
    let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    // Add ?mode=rwc to create the file if it doesn't exist
    let connect_url = if database_url.contains('?') {
        database_url.to_string()
    } else {
        format!("{}?mode=rwc", database_url)
    };

    // Configure connection options optimized for SQLite
    // - WAL mode for better read/write concurrency
    // - busy_timeout to wait for locks instead of immediate failure
    let connect_options = SqliteConnectOptions::from_str(&connect_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal) // Faster writes, still safe with WAL
        .busy_timeout(Duration::from_secs(30)) // Wait up to 30s for locks
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(5));

    // SQLite prefers smaller connection pools (1-3 connections)
    // Larger pools cause contention since SQLite has a single writer
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    // Enable foreign keys (must be set per-connection, but pool handles this)
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    tracing::info!(
        "SQLite pool initialized: max_connections=2, busy_timeout=30s, journal_mode=WAL"
    );

    Ok(pool)
}

/// Ignores "duplicate column name" errors so an `ALTER TABLE ... ADD COLUMN`
/// migration can be re-run safely against a database that already has it.
async fn add_column_if_missing(pool: &SqlitePool, sql: &str) -> Result<(), sqlx::Error> {
    match sqlx::query(sql).execute(pool).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // =====================
    // Migration 001: Users
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            password_hash TEXT NOT NULL,
            email TEXT,
            user_state TEXT NOT NULL DEFAULT 'active' CHECK(user_state IN ('active', 'pending_approval', 'revoked')),
            token_version INTEGER NOT NULL DEFAULT 1,
            deletion_requested_at TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 002: Groups
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            label TEXT,
            owner_user_id INTEGER NOT NULL REFERENCES users(id),
            join_code TEXT NOT NULL,
            default_currency TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            deleted_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_groups_join_code_active
         ON groups(join_code) WHERE deleted_at IS NULL",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 003: Memberships
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS memberships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            role TEXT NOT NULL CHECK(role IN ('owner', 'admin', 'member', 'viewer')),
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'left')),
            joined_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            left_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    // Uniqueness is enforced on (group_id, user_id) regardless of status: a
    // rejoin UPDATEs this row rather than inserting a second one.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_memberships_group_user
         ON memberships(group_id, user_id)",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 004: Expenses, items, splits, payers
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            creator_member_id INTEGER NOT NULL REFERENCES memberships(id),
            name TEXT NOT NULL,
            category TEXT,
            currency TEXT NOT NULL,
            subtotal INTEGER NOT NULL,
            expense_date TEXT NOT NULL,
            recurring_rule_id INTEGER,
            recurring_occurrence_date TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            deleted_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    // Idempotency key for recurring-engine materialization: two workers
    // racing to generate the same occurrence will have one succeed and one
    // hit this constraint.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_expenses_recurring_occurrence
         ON expenses(recurring_rule_id, recurring_occurrence_date)
         WHERE recurring_rule_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS expense_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expense_id INTEGER NOT NULL REFERENCES expenses(id),
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            unit_value INTEGER NOT NULL,
            item_total INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS expense_item_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL REFERENCES expense_items(id),
            member_id INTEGER NOT NULL REFERENCES memberships(id),
            share_mode TEXT NOT NULL CHECK(share_mode IN ('equal', 'weighted', 'exact')),
            weight INTEGER,
            exact_amount INTEGER,
            computed_share INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS expense_payers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expense_id INTEGER NOT NULL REFERENCES expenses(id),
            member_id INTEGER NOT NULL REFERENCES memberships(id),
            amount INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 005: Settlements
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settlements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            payer_member_id INTEGER NOT NULL REFERENCES memberships(id),
            payee_member_id INTEGER NOT NULL REFERENCES memberships(id),
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'confirmed', 'rejected', 'cancelled')),
            note TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 006: Recurring rules, payers, splits
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recurring_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            creator_member_id INTEGER NOT NULL REFERENCES memberships(id),
            name TEXT NOT NULL,
            category TEXT,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            frequency TEXT NOT NULL CHECK(frequency IN ('daily', 'weekly', 'biweekly', 'monthly', 'yearly')),
            day_of_week INTEGER,
            day_of_month INTEGER,
            month_of_year INTEGER,
            start_date TEXT NOT NULL,
            end_date TEXT,
            next_occurrence TEXT NOT NULL,
            last_generated_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recurring_payers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recurring_rule_id INTEGER NOT NULL REFERENCES recurring_rules(id),
            member_id INTEGER NOT NULL REFERENCES memberships(id),
            amount INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recurring_splits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recurring_rule_id INTEGER NOT NULL REFERENCES recurring_rules(id),
            member_id INTEGER NOT NULL REFERENCES memberships(id),
            share_mode TEXT NOT NULL CHECK(share_mode IN ('equal', 'weighted', 'exact')),
            weight INTEGER,
            exact_amount INTEGER
        )",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 007: Notifications
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            notification_type TEXT NOT NULL,
            reference_type TEXT NOT NULL,
            reference_id INTEGER NOT NULL,
            amount INTEGER,
            currency TEXT,
            read_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 008: History log, append-only by trigger
    // =====================
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS history_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            correlation_id TEXT NOT NULL,
            actor_user_id INTEGER,
            group_id INTEGER,
            entity_type TEXT NOT NULL,
            entity_id INTEGER,
            action TEXT NOT NULL,
            payload_before TEXT,
            payload_after TEXT,
            reason TEXT,
            undoes_history_id INTEGER,
            previous_hash TEXT,
            entry_hash TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TRIGGER IF NOT EXISTS history_no_update
         BEFORE UPDATE ON history_log
         BEGIN
             SELECT RAISE(FAIL, 'history_log is append-only');
         END",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TRIGGER IF NOT EXISTS history_no_delete
         BEFORE DELETE ON history_log
         BEGIN
             SELECT RAISE(FAIL, 'history_log is append-only');
         END",
    )
    .execute(pool)
    .await?;

    // =====================
    // Migration 009: indices supporting common read paths
    // =====================
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_expenses_group ON expenses(group_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_settlements_group ON settlements(group_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recurring_rules_due ON recurring_rules(is_active, next_occurrence)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_log_group ON history_log(group_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id)")
        .execute(pool)
        .await?;

    // =====================
    // Migration 010: columns added after the initial cut, kept idempotent
    // the same way the rest of this migration set is, so re-running against
    // an already-migrated database is always safe.
    // =====================
    add_column_if_missing(pool, "ALTER TABLE users ADD COLUMN language TEXT").await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite connect");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.expect("second run of migrations");
    }

    #[tokio::test]
    async fn join_code_unique_index_rejects_duplicate_active_codes() {
        let pool = memory_pool().await;
        sqlx::query("INSERT INTO users (username, password_hash) VALUES ('a', 'x')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO groups (name, owner_user_id, join_code, default_currency) VALUES ('g1', 1, 'ABCDEFGH', 'USD')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let result = sqlx::query(
            "INSERT INTO groups (name, owner_user_id, join_code, default_currency) VALUES ('g2', 1, 'ABCDEFGH', 'USD')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
