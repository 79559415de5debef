use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use sqlx::SqlitePool;

use crate::{
    auth::{AuthUser, GroupMember, OwnerMember},
    error::{AppError, AppResult},
    models::{CreateGroup, Group, GroupWithRole, JoinGroup, TransferOwnership, UpdateGroup},
    services::{group_service, history::HistoryService},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/join", post(join_group))
        .route(
            "/{id}",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route("/{id}/leave", post(leave_group))
        .route("/{id}/regenerate-code", post(regenerate_code))
        .route("/{id}/transfer-ownership", post(transfer_ownership))
}

async fn list_groups(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<Vec<GroupWithRole>>> {
    let rows: Vec<(Group, String)> = sqlx::query_as(
        "SELECT g.id, g.name, g.label, g.owner_user_id, g.join_code, g.default_currency,
                g.created_at, g.updated_at, g.deleted_at, m.role
         FROM groups g
         JOIN memberships m ON m.group_id = g.id
         WHERE m.user_id = ? AND m.status = 'active' AND g.deleted_at IS NULL
         ORDER BY g.id DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(group, role)| GroupWithRole { group, role })
            .collect(),
    ))
}

async fn create_group(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
    Json(input): Json<CreateGroup>,
) -> AppResult<Json<Group>> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("group name is required".to_string()));
    }

    let join_code = group_service::generate_unique_join_code(&pool).await?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO groups (name, label, owner_user_id, join_code, default_currency) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(&input.label)
    .bind(auth.user_id)
    .bind(&join_code)
    .bind(&input.default_currency)
    .execute(&mut *tx)
    .await?;

    let group_id = result.last_insert_rowid();

    sqlx::query(
        "INSERT INTO memberships (group_id, user_id, role, status) VALUES (?, ?, 'owner', 'active')",
    )
    .bind(group_id)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    let group: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_create(
        &pool,
        &correlation_id,
        auth.user_id,
        group_id,
        crate::models::EntityType::Group,
        group_id,
        &group,
    )
    .await;

    Ok(Json(group))
}

async fn get_group(member: GroupMember, State(pool): State<SqlitePool>) -> AppResult<Json<Group>> {
    let group: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(member.group_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;

    Ok(Json(group))
}

async fn update_group(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Json(input): Json<UpdateGroup>,
) -> AppResult<Json<Group>> {
    if !member.is_admin_or_above() {
        return Err(AppError::Forbidden(
            "Only admins can update group settings".to_string(),
        ));
    }

    let before: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(member.group_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;

    let name = input.name.unwrap_or(before.name.clone());
    let label = input.label.or(before.label.clone());

    sqlx::query(
        "UPDATE groups SET name = ?, label = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
    )
    .bind(&name)
    .bind(&label)
    .bind(member.group_id)
    .execute(&pool)
    .await?;

    let after: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ?")
        .bind(member.group_id)
        .fetch_one(&pool)
        .await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_update(
        &pool,
        crate::services::history::LogUpdateParams {
            correlation_id: &correlation_id,
            actor_user_id: member.user_id,
            group_id: member.group_id,
            entity_type: crate::models::EntityType::Group,
            entity_id: member.group_id,
            before: &before,
            after: &after,
        },
    )
    .await;

    Ok(Json(after))
}

async fn delete_group(owner: OwnerMember, State(pool): State<SqlitePool>) -> AppResult<()> {
    let member = owner.0;

    let before: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(member.group_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;

    sqlx::query(
        "UPDATE groups SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
    )
    .bind(member.group_id)
    .execute(&pool)
    .await?;

    let correlation_id = HistoryService::new_correlation_id();
    HistoryService::log_delete(
        &pool,
        &correlation_id,
        member.user_id,
        member.group_id,
        crate::models::EntityType::Group,
        member.group_id,
        &before,
    )
    .await?;

    let member_user_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM memberships WHERE group_id = ? AND status = 'active' AND user_id != ?",
    )
    .bind(member.group_id)
    .bind(member.user_id)
    .fetch_all(&pool)
    .await?;

    for user_id in member_user_ids {
        crate::services::notification_service::notify_user(
            &pool,
            user_id,
            crate::models::NotificationType::GroupDeleted,
            "group",
            member.group_id,
            None,
            None,
        )
        .await?;
    }

    Ok(())
}

async fn join_group(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
    Json(input): Json<JoinGroup>,
) -> AppResult<Json<Group>> {
    let normalized = input.join_code.trim().to_uppercase();

    let membership = group_service::join_by_code(&pool, auth.user_id, &normalized).await?;

    let group: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ?")
        .bind(membership.group_id)
        .fetch_one(&pool)
        .await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_create(
        &pool,
        &correlation_id,
        auth.user_id,
        group.id,
        crate::models::EntityType::Membership,
        membership.id,
        &membership,
    )
    .await;

    Ok(Json(group))
}

async fn leave_group(member: GroupMember, State(pool): State<SqlitePool>) -> AppResult<()> {
    if member.role == crate::models::Role::Owner {
        return Err(AppError::BadRequest(
            "The owner must transfer ownership before leaving".to_string(),
        ));
    }

    group_service::leave_group(&pool, member.group_id, member.user_id).await
}

async fn regenerate_code(
    owner: OwnerMember,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<Group>> {
    let member = owner.0;
    let new_code = group_service::generate_unique_join_code(&pool).await?;

    sqlx::query(
        "UPDATE groups SET join_code = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
    )
    .bind(&new_code)
    .bind(member.group_id)
    .execute(&pool)
    .await?;

    let group: Group = sqlx::query_as("SELECT * FROM groups WHERE id = ?")
        .bind(member.group_id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(group))
}

async fn transfer_ownership(
    owner: OwnerMember,
    State(pool): State<SqlitePool>,
    Path(_id): Path<i64>,
    Json(input): Json<TransferOwnership>,
) -> AppResult<()> {
    let member = owner.0;

    if input.target_user_id == member.user_id {
        return Err(AppError::BadRequest(
            "Cannot transfer ownership to yourself".to_string(),
        ));
    }

    group_service::transfer_ownership(&pool, member.group_id, member.user_id, input.target_user_id)
        .await
}
