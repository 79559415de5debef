use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::GroupMember,
    error::AppResult,
    models::{CreateSettlement, Settlement},
    services::{settlement_service, BalanceCache},
    AppState,
};

#[derive(Deserialize)]
struct SettlementPath {
    id: i64,
    settlement_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_settlements).post(create_settlement))
        .route("/{settlement_id}/confirm", post(confirm_settlement))
        .route("/{settlement_id}/reject", post(reject_settlement))
        .route("/{settlement_id}/cancel", post(cancel_settlement))
}

async fn group_currency(pool: &SqlitePool, group_id: i64) -> AppResult<String> {
    sqlx::query_scalar("SELECT default_currency FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(group_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

async fn list_settlements(
    member: GroupMember,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<Vec<Settlement>>> {
    let settlements: Vec<Settlement> = sqlx::query_as(
        "SELECT * FROM settlements WHERE group_id = ? ORDER BY id DESC",
    )
    .bind(member.group_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(settlements))
}

async fn create_settlement(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Json(input): Json<CreateSettlement>,
) -> AppResult<Json<Settlement>> {
    let currency = group_currency(&pool, member.group_id).await?;
    let settlement = settlement_service::create_settlement(
        &pool,
        member.group_id,
        &currency,
        member.membership_id,
        input,
    )
    .await?;

    Ok(Json(settlement))
}

async fn confirm_settlement(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Path(SettlementPath { id: _, settlement_id }): Path<SettlementPath>,
) -> AppResult<Json<Settlement>> {
    let settlement = settlement_service::confirm(
        &pool,
        &cache,
        member.group_id,
        settlement_id,
        member.membership_id,
    )
    .await?;

    Ok(Json(settlement))
}

async fn reject_settlement(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Path(SettlementPath { id: _, settlement_id }): Path<SettlementPath>,
) -> AppResult<Json<Settlement>> {
    let settlement = settlement_service::reject(
        &pool,
        &cache,
        member.group_id,
        settlement_id,
        member.membership_id,
    )
    .await?;

    Ok(Json(settlement))
}

async fn cancel_settlement(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Path(SettlementPath { id: _, settlement_id }): Path<SettlementPath>,
) -> AppResult<Json<Settlement>> {
    let settlement = settlement_service::cancel(
        &pool,
        &cache,
        member.group_id,
        settlement_id,
        member.membership_id,
    )
    .await?;

    Ok(Json(settlement))
}
