use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use sqlx::SqlitePool;

use crate::{
    auth::GroupMember,
    error::AppResult,
    models::{ChainVerification, HistoryEntryResponse, HistoryQuery},
    services::HistoryService,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_group_history))
        .route("/verify", get(verify_chain))
        .route("/{entity_type}/{entity_id}", get(get_entity_history))
}

async fn get_group_history(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<HistoryEntryResponse>>> {
    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let entries = HistoryService::get_group_history(
        &pool,
        member.group_id,
        limit,
        offset,
        query.entity_type.as_deref(),
    )
    .await?;

    let responses = HistoryService::resolve_actor_names(&pool, entries).await?;

    Ok(Json(responses))
}

#[derive(serde::Deserialize)]
struct EntityPath {
    id: i64,
    entity_type: String,
    entity_id: i64,
}

async fn get_entity_history(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Path(path): Path<EntityPath>,
) -> AppResult<Json<Vec<HistoryEntryResponse>>> {
    let _ = path.id;
    let entries = HistoryService::get_entity_history(
        &pool,
        member.group_id,
        &path.entity_type,
        path.entity_id,
    )
    .await?;

    let responses = HistoryService::resolve_actor_names(&pool, entries).await?;

    Ok(Json(responses))
}

async fn verify_chain(_member: GroupMember, State(pool): State<SqlitePool>) -> AppResult<Json<ChainVerification>> {
    let verification = HistoryService::verify_chain(&pool).await?;
    Ok(Json(verification))
}
