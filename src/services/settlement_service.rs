//! Settlement state machine: `pending -> {confirmed, rejected}` (payee-only)
//! and `pending -> cancelled` (payer-only). Every other transition,
//! including any transition out of a terminal state, is `InvalidTransition`.
//!
//! The linchpin of correctness under concurrency is the guard itself: each
//! transition is a single `UPDATE ... WHERE status = 'pending'` and a
//! `rows_affected() == 0` is treated as the guard having failed, exactly as
//! the money-kernel design note prescribes. Two concurrent confirmations
//! race on that row and only one of them can ever see `rows_affected() == 1`.

use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{CreateSettlement, EntityType, NotificationType, Settlement, SettlementStatus};
use crate::money;
use crate::services::balance_cache::BalanceCache;
use crate::services::history::HistoryService;
use crate::services::notification_service;

async fn active_member_user_id(
    pool: &SqlitePool,
    group_id: i64,
    member_id: i64,
) -> AppResult<Option<i64>> {
    sqlx::query_scalar(
        "SELECT user_id FROM memberships WHERE id = ? AND group_id = ? AND status = 'active'",
    )
    .bind(member_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}

pub async fn create_settlement(
    pool: &SqlitePool,
    group_id: i64,
    group_currency: &str,
    actor_member_id: i64,
    input: CreateSettlement,
) -> AppResult<Settlement> {
    if input.payer_member_id == input.payee_member_id {
        return Err(AppError::BadRequest(
            "payer and payee must be different members".to_string(),
        ));
    }
    if actor_member_id != input.payer_member_id {
        return Err(AppError::Forbidden(
            "only the payer may record a settlement against themselves".to_string(),
        ));
    }

    let currency = input.currency.as_deref().unwrap_or(group_currency);
    money::same_currency(currency, group_currency)?;

    let payer_user = active_member_user_id(pool, group_id, input.payer_member_id).await?;
    let payee_user = active_member_user_id(pool, group_id, input.payee_member_id).await?;
    if payer_user.is_none() || payee_user.is_none() {
        return Err(AppError::BadRequest(
            "both payer and payee must be active members of the group".to_string(),
        ));
    }

    let amount = money::parse_amount(&input.amount, currency)?;
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "settlement amount must be positive".to_string(),
        ));
    }

    let result = sqlx::query(
        "INSERT INTO settlements (group_id, payer_member_id, payee_member_id, amount, currency, status, note)
         VALUES (?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(group_id)
    .bind(input.payer_member_id)
    .bind(input.payee_member_id)
    .bind(amount)
    .bind(currency)
    .bind(&input.note)
    .execute(pool)
    .await?;

    let settlement_id = result.last_insert_rowid();
    let settlement: Settlement = sqlx::query_as("SELECT * FROM settlements WHERE id = ?")
        .bind(settlement_id)
        .fetch_one(pool)
        .await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_create(
        pool,
        &correlation_id,
        payer_user.unwrap(),
        group_id,
        EntityType::Settlement,
        settlement_id,
        &settlement,
    )
    .await;

    if let Some(payee_user_id) = payee_user {
        notification_service::notify_user(
            pool,
            payee_user_id,
            NotificationType::SettlementRequested,
            "settlement",
            settlement_id,
            Some(amount),
            Some(currency),
        )
        .await?;
    }

    Ok(settlement)
}

async fn load_pending(pool: &SqlitePool, group_id: i64, settlement_id: i64) -> AppResult<Settlement> {
    sqlx::query_as("SELECT * FROM settlements WHERE id = ? AND group_id = ?")
        .bind(settlement_id)
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Settlement not found".to_string()))
}

/// `pending -> confirmed`, payee only. The confirmed amount starts
/// contributing to balances the moment this commits.
pub async fn confirm(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    settlement_id: i64,
    actor_member_id: i64,
) -> AppResult<Settlement> {
    let before = load_pending(pool, group_id, settlement_id).await?;
    if actor_member_id != before.payee_member_id {
        return Err(AppError::Forbidden(
            "only the payee may confirm a settlement".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE settlements SET status = 'confirmed', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND group_id = ? AND status = 'pending'",
    )
    .bind(settlement_id)
    .bind(group_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "settlement is no longer pending".to_string(),
        ));
    }

    finish_transition(
        pool,
        cache,
        group_id,
        settlement_id,
        &before,
        NotificationType::SettlementConfirmed,
        before.payer_member_id,
    )
    .await
}

/// `pending -> rejected`, payee only. No balance effect.
pub async fn reject(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    settlement_id: i64,
    actor_member_id: i64,
) -> AppResult<Settlement> {
    let before = load_pending(pool, group_id, settlement_id).await?;
    if actor_member_id != before.payee_member_id {
        return Err(AppError::Forbidden(
            "only the payee may reject a settlement".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE settlements SET status = 'rejected', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND group_id = ? AND status = 'pending'",
    )
    .bind(settlement_id)
    .bind(group_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "settlement is no longer pending".to_string(),
        ));
    }

    finish_transition(
        pool,
        cache,
        group_id,
        settlement_id,
        &before,
        NotificationType::SettlementRejected,
        before.payer_member_id,
    )
    .await
}

/// `pending -> cancelled`, payer only. No balance effect.
pub async fn cancel(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    settlement_id: i64,
    actor_member_id: i64,
) -> AppResult<Settlement> {
    let before = load_pending(pool, group_id, settlement_id).await?;
    if actor_member_id != before.payer_member_id {
        return Err(AppError::Forbidden(
            "only the payer may cancel a settlement".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE settlements SET status = 'cancelled', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND group_id = ? AND status = 'pending'",
    )
    .bind(settlement_id)
    .bind(group_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "settlement is no longer pending".to_string(),
        ));
    }

    // Cancellation has no balance effect and no notification recipient
    // beyond the actor themselves, so skip the cache invalidation and
    // notification fan-out the other two transitions need.
    let _ = cache;
    let after: Settlement = sqlx::query_as("SELECT * FROM settlements WHERE id = ?")
        .bind(settlement_id)
        .fetch_one(pool)
        .await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_update(
        pool,
        crate::services::history::LogUpdateParams {
            correlation_id: &correlation_id,
            actor_user_id: active_member_user_id(pool, group_id, actor_member_id)
                .await?
                .unwrap_or_default(),
            group_id,
            entity_type: EntityType::Settlement,
            entity_id: settlement_id,
            before: &before,
            after: &after,
        },
    )
    .await;

    Ok(after)
}

async fn finish_transition(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    settlement_id: i64,
    before: &Settlement,
    notify_type: NotificationType,
    notify_member_id: i64,
) -> AppResult<Settlement> {
    let after: Settlement = sqlx::query_as("SELECT * FROM settlements WHERE id = ?")
        .bind(settlement_id)
        .fetch_one(pool)
        .await?;

    let actor_user_id = active_member_user_id(pool, group_id, before.payee_member_id)
        .await?
        .unwrap_or_default();

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_update(
        pool,
        crate::services::history::LogUpdateParams {
            correlation_id: &correlation_id,
            actor_user_id,
            group_id,
            entity_type: EntityType::Settlement,
            entity_id: settlement_id,
            before,
            after: &after,
        },
    )
    .await;

    cache.invalidate(group_id).await;

    if let Some(user_id) = active_member_user_id(pool, group_id, notify_member_id).await? {
        notification_service::notify_user(
            pool,
            user_id,
            notify_type,
            "settlement",
            settlement_id,
            Some(after.amount),
            Some(&after.currency),
        )
        .await?;
    }

    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn group_with_two_members() -> (SqlitePool, i64, i64, i64) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO users (username, password_hash) VALUES ('alice', 'x'), ('bob', 'x')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO groups (name, owner_user_id, join_code, default_currency) VALUES ('trip', 1, 'ABCDEFGH', 'USD')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO memberships (group_id, user_id, role, status) VALUES (1, 1, 'owner', 'active'), (1, 2, 'member', 'active')",
        )
        .execute(&pool)
        .await
        .unwrap();

        (pool, 1, 1, 2)
    }

    #[tokio::test]
    async fn confirm_requires_payee() {
        let (pool, group_id, payer, payee) = group_with_two_members().await;
        let settlement = create_settlement(
            &pool,
            group_id,
            "USD",
            payer,
            CreateSettlement {
                payer_member_id: payer,
                payee_member_id: payee,
                amount: "20.00".to_string(),
                currency: None,
                note: None,
            },
        )
        .await
        .unwrap();

        let cache = BalanceCache::new(60);
        let result = confirm(&pool, &cache, group_id, settlement.id, payer).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let confirmed = confirm(&pool, &cache, group_id, settlement.id, payee)
            .await
            .unwrap();
        assert_eq!(confirmed.status(), SettlementStatus::Confirmed);
    }

    #[tokio::test]
    async fn double_confirm_is_invalid_transition() {
        let (pool, group_id, payer, payee) = group_with_two_members().await;
        let settlement = create_settlement(
            &pool,
            group_id,
            "USD",
            payer,
            CreateSettlement {
                payer_member_id: payer,
                payee_member_id: payee,
                amount: "20.00".to_string(),
                currency: None,
                note: None,
            },
        )
        .await
        .unwrap();

        let cache = BalanceCache::new(60);
        confirm(&pool, &cache, group_id, settlement.id, payee)
            .await
            .unwrap();
        let second = confirm(&pool, &cache, group_id, settlement.id, payee).await;
        assert!(matches!(second, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn cannot_settle_with_self() {
        let (pool, group_id, payer, _payee) = group_with_two_members().await;
        let result = create_settlement(
            &pool,
            group_id,
            "USD",
            payer,
            CreateSettlement {
                payer_member_id: payer,
                payee_member_id: payer,
                amount: "10.00".to_string(),
                currency: None,
                note: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
