//! Group lifecycle and membership rules: join-code generation, join/rejoin
//! semantics, and ownership transfer. Role permission checks for a request
//! already in flight live in `auth::middleware`; this module is for the
//! mutations themselves.

use rand::Rng;
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::models::{MembershipRow, MembershipStatus, Role};

/// Excludes visually ambiguous characters (0/O, 1/I/L) so a code read aloud
/// or copied by hand doesn't get misentered.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const JOIN_CODE_LENGTH: usize = 8;

pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

async fn join_code_taken(pool: &SqlitePool, code: &str) -> AppResult<bool> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM groups WHERE join_code = ? AND deleted_at IS NULL",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(existing.is_some())
}

/// Generates a join code guaranteed not to collide with any non-deleted
/// group's code: tries the plain alphabet three times, then falls back to
/// a timestamp-suffixed code a third collision can't plausibly produce
/// again. Per spec §4.7 ("three retries then a timestamp-suffixed
/// fallback").
pub async fn generate_unique_join_code(pool: &SqlitePool) -> AppResult<String> {
    for _ in 0..3 {
        let code = generate_join_code();
        if !join_code_taken(pool, &code).await? {
            return Ok(code);
        }
    }

    let fallback = format!("{}{}", generate_join_code(), chrono::Utc::now().timestamp_millis());
    Ok(fallback)
}

/// Adds a user to a group by join code. If the user previously left
/// (`status = 'left'`), the existing membership row is reactivated instead
/// of a second row being inserted - `(group_id, user_id)` is unique, so a
/// plain INSERT would fail for a returning member.
pub async fn join_by_code(
    pool: &SqlitePool,
    user_id: i64,
    join_code: &str,
) -> AppResult<MembershipRow> {
    let group_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM groups WHERE join_code = ? AND deleted_at IS NULL",
    )
    .bind(join_code)
    .fetch_optional(pool)
    .await?;

    let group_id = group_id.ok_or_else(|| AppError::NotFound("No such group".to_string()))?;

    let mut tx = pool.begin().await?;

    let existing: Option<MembershipRow> =
        sqlx::query_as("SELECT * FROM memberships WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

    let membership = if let Some(row) = existing {
        if row.status == MembershipStatus::Active.as_str() {
            return Err(AppError::Conflict("Already a member of this group".to_string()));
        }
        sqlx::query(
            "UPDATE memberships SET status = 'active', left_at = NULL WHERE id = ?",
        )
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query_as("SELECT * FROM memberships WHERE id = ?")
            .bind(row.id)
            .fetch_one(&mut *tx)
            .await?
    } else {
        let result = sqlx::query(
            "INSERT INTO memberships (group_id, user_id, role, status) VALUES (?, ?, 'member', 'active')",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query_as("SELECT * FROM memberships WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&mut *tx)
            .await?
    };

    tx.commit().await?;

    Ok(membership)
}

/// Marks a membership as `left` rather than deleting the row, so history and
/// past expense/settlement references (which point at `memberships.id`)
/// remain intact. A later `join_by_code` reactivates the same row.
pub async fn leave_group(pool: &SqlitePool, group_id: i64, user_id: i64) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE memberships SET status = 'left', left_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE group_id = ? AND user_id = ? AND status = 'active'",
    )
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Not an active member".to_string()));
    }

    Ok(())
}

/// Transfers group ownership to another active member. The previous owner
/// is demoted to `admin`, not `member`: an owner giving up a group they
/// created is assumed to still want full management rights over it.
pub async fn transfer_ownership<'e, E>(
    executor: E,
    group_id: i64,
    current_owner_user_id: i64,
    target_user_id: i64,
) -> AppResult<()>
where
    E: Executor<'e, Database = Sqlite> + Copy,
{
    let target_role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM memberships WHERE group_id = ? AND user_id = ? AND status = 'active'",
    )
    .bind(group_id)
    .bind(target_user_id)
    .fetch_optional(executor)
    .await?;

    if target_role.is_none() {
        return Err(AppError::NotFound(
            "Target user is not an active member of this group".to_string(),
        ));
    }

    sqlx::query("UPDATE memberships SET role = ? WHERE group_id = ? AND user_id = ?")
        .bind(Role::Admin.as_str())
        .bind(group_id)
        .bind(current_owner_user_id)
        .execute(executor)
        .await?;

    sqlx::query("UPDATE memberships SET role = ? WHERE group_id = ? AND user_id = ?")
        .bind(Role::Owner.as_str())
        .bind(group_id)
        .bind(target_user_id)
        .execute(executor)
        .await?;

    sqlx::query("UPDATE groups SET owner_user_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?")
        .bind(target_user_id)
        .bind(group_id)
        .execute(executor)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_use_only_the_unambiguous_alphabet() {
        for _ in 0..200 {
            let code = generate_join_code();
            assert_eq!(code.len(), JOIN_CODE_LENGTH);
            for c in code.bytes() {
                assert!(
                    JOIN_CODE_ALPHABET.contains(&c),
                    "unexpected character {} in join code {}",
                    c as char,
                    code
                );
            }
            assert!(!code.contains(['0', 'O', '1', 'I', 'L']));
        }
    }

    async fn pool_with_schema() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_group_with_code(pool: &SqlitePool, code: &str) {
        sqlx::query(
            "INSERT INTO users (username, password_hash) VALUES (?, 'x')",
        )
        .bind(format!("owner-{code}"))
        .execute(pool)
        .await
        .unwrap();
        let owner_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(format!("owner-{code}"))
            .fetch_one(pool)
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO groups (name, owner_user_id, join_code, default_currency) VALUES ('g', ?, ?, 'USD')",
        )
        .bind(owner_id)
        .bind(code)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unique_join_code_skips_a_taken_code() {
        let pool = pool_with_schema().await;
        insert_group_with_code(&pool, "AAAAAAAA").await;

        let code = generate_unique_join_code(&pool).await.unwrap();
        assert!(!join_code_taken(&pool, &code).await.unwrap());
    }

    #[tokio::test]
    async fn join_code_taken_reflects_active_groups_only() {
        let pool = pool_with_schema().await;
        insert_group_with_code(&pool, "BCDFGHJK").await;

        assert!(join_code_taken(&pool, "BCDFGHJK").await.unwrap());
        assert!(!join_code_taken(&pool, "ZZZZZZZZ").await.unwrap());
    }
}
