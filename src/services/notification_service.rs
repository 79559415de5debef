//! Append-only notification sink. Every write here is an insert; there is no
//! update or delete path in application code, matching the append-only
//! discipline `history_log` already follows. Read/unread state is the only
//! thing a caller may change after the fact, and that's a thin concern left
//! to the route layer.

use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{Notification, NotificationType};

/// Inserts one notification per member, skipping the actor themselves -
/// nobody needs to be told about their own action.
pub async fn notify_group_members(
    pool: &SqlitePool,
    group_id: i64,
    member_ids: &[i64],
    actor_member_id: i64,
    notification_type: NotificationType,
    reference_type: &str,
    reference_id: i64,
    amount: Option<i64>,
    currency: Option<&str>,
) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();

    for &member_id in member_ids {
        if member_id == actor_member_id {
            continue;
        }
        if !seen.insert(member_id) {
            continue;
        }

        let user_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM memberships WHERE id = ? AND group_id = ?",
        )
        .bind(member_id)
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        let Some(user_id) = user_id else { continue };

        notify_user(
            pool,
            user_id,
            notification_type,
            reference_type,
            reference_id,
            amount,
            currency,
        )
        .await?;
    }

    Ok(())
}

pub async fn notify_user(
    pool: &SqlitePool,
    user_id: i64,
    notification_type: NotificationType,
    reference_type: &str,
    reference_id: i64,
    amount: Option<i64>,
    currency: Option<&str>,
) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO notifications (user_id, notification_type, reference_type, reference_id, amount, currency)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(notification_type.as_str())
    .bind(reference_type)
    .bind(reference_id)
    .bind(amount)
    .bind(currency)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    unread_only: bool,
) -> AppResult<Vec<Notification>> {
    let notifications = if unread_only {
        sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = ? AND read_at IS NULL ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as("SELECT * FROM notifications WHERE user_id = ? ORDER BY id DESC")
            .bind(user_id)
            .fetch_all(pool)
            .await?
    };

    Ok(notifications)
}

pub async fn mark_read(pool: &SqlitePool, user_id: i64, notification_id: i64) -> AppResult<()> {
    sqlx::query(
        "UPDATE notifications SET read_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND user_id = ? AND read_at IS NULL",
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}
