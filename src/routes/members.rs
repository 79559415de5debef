use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{AdminMember, GroupMember},
    error::{AppError, AppResult},
    models::{MemberResponse, Role, UpdateMemberRole},
    AppState,
};

#[derive(Deserialize)]
struct MemberPath {
    id: i64,
    member_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members))
        .route(
            "/{member_id}",
            axum::routing::put(update_member_role).delete(remove_member),
        )
}

async fn list_members(
    member: GroupMember,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<Vec<MemberResponse>>> {
    let rows: Vec<MemberResponse> = sqlx::query_as(
        "SELECT m.id, m.user_id, u.username, u.display_name, m.role, m.status, m.joined_at
         FROM memberships m JOIN users u ON u.id = m.user_id
         WHERE m.group_id = ?
         ORDER BY m.id ASC",
    )
    .bind(member.group_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(rows))
}

async fn update_member_role(
    admin: AdminMember,
    State(pool): State<SqlitePool>,
    Path(MemberPath { id: _, member_id }): Path<MemberPath>,
    Json(input): Json<UpdateMemberRole>,
) -> AppResult<Json<MemberResponse>> {
    let member = admin.0;

    let target_role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM memberships WHERE id = ? AND group_id = ? AND status = 'active'",
    )
    .bind(member_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    let target_role: Role = target_role
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?
        .parse()
        .map_err(|_| AppError::Internal("Invalid role in database".to_string()))?;

    if target_role == Role::Owner {
        return Err(AppError::BadRequest(
            "Use transfer-ownership to change the owner".to_string(),
        ));
    }
    if input.role == Role::Owner {
        return Err(AppError::BadRequest(
            "Use transfer-ownership to grant ownership".to_string(),
        ));
    }

    sqlx::query("UPDATE memberships SET role = ? WHERE id = ?")
        .bind(input.role.as_str())
        .bind(member_id)
        .execute(&pool)
        .await?;

    let updated: MemberResponse = sqlx::query_as(
        "SELECT m.id, m.user_id, u.username, u.display_name, m.role, m.status, m.joined_at
         FROM memberships m JOIN users u ON u.id = m.user_id
         WHERE m.id = ?",
    )
    .bind(member_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(updated))
}

async fn remove_member(
    admin: AdminMember,
    State(pool): State<SqlitePool>,
    Path(MemberPath { id: _, member_id }): Path<MemberPath>,
) -> AppResult<()> {
    let member = admin.0;

    if member_id == member.membership_id {
        return Err(AppError::BadRequest(
            "Use leave to remove yourself from a group".to_string(),
        ));
    }

    let target_role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM memberships WHERE id = ? AND group_id = ? AND status = 'active'",
    )
    .bind(member_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    let target_role: Role = target_role
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?
        .parse()
        .map_err(|_| AppError::Internal("Invalid role in database".to_string()))?;

    if target_role == Role::Owner {
        return Err(AppError::BadRequest(
            "The owner cannot be removed".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE memberships SET status = 'left', left_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND group_id = ? AND status = 'active'",
    )
    .bind(member_id)
    .bind(member.group_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Member not found".to_string()));
    }

    Ok(())
}
