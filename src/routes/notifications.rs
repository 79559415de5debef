use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use sqlx::SqlitePool;

use crate::{auth::AuthUser, error::AppResult, models::{Notification, NotificationListQuery}, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/{id}/read", axum::routing::post(mark_notification_read))
}

async fn list_notifications(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
    Query(filter): Query<NotificationListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = crate::services::notification_service::list_for_user(
        &pool,
        auth.user_id,
        filter.unread_only.unwrap_or(false),
    )
    .await?;

    Ok(Json(notifications))
}

async fn mark_notification_read(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> AppResult<()> {
    crate::services::notification_service::mark_read(&pool, auth.user_id, id).await
}
