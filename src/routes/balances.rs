use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::{
    auth::GroupMember, error::AppResult, services::balance_engine::BalanceSummary,
    services::BalanceCache, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_balances))
}

async fn get_balances(
    member: GroupMember,
    State(pool): State<sqlx::SqlitePool>,
    State(cache): State<BalanceCache>,
) -> AppResult<Json<Arc<BalanceSummary>>> {
    let summary = cache.get_or_compute(&pool, member.group_id).await?;
    Ok(Json(summary))
}
