use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::{Role, UserState};

use super::jwt::validate_token;

/// Extractor for authenticated users. Validates JWT signature/expiration and
/// checks `user_state` and `token_version` against the database on every
/// request, so a revoked account or a rotated token is rejected immediately
/// rather than only once the JWT itself expires.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or(AppError::Internal("JWT secret not configured".to_string()))?;

        let claims = validate_token(bearer.token(), &jwt_secret.0)?;

        let pool = parts
            .extensions
            .get::<SqlitePool>()
            .ok_or(AppError::Internal(
                "Database pool not configured".to_string(),
            ))?;

        let user_data: Option<(String, i64)> =
            sqlx::query_as("SELECT user_state, token_version FROM users WHERE id = ?")
                .bind(claims.sub)
                .fetch_optional(pool)
                .await
                .map_err(|e| AppError::Internal(format!("Database error: {}", e)))?;

        let (user_state_str, db_token_version) = user_data.ok_or(AppError::Unauthorized)?;

        if claims.token_version != db_token_version {
            return Err(AppError::TokenInvalidated);
        }

        let user_state: UserState = user_state_str.parse().unwrap_or_default();

        match user_state {
            UserState::Active => {}
            UserState::PendingApproval => return Err(AppError::AccountPendingApproval),
            UserState::Revoked => return Err(AppError::AccountRevoked),
        }

        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}

/// JWT secret wrapper for request extensions
#[derive(Clone)]
pub struct JwtSecret(pub String);

/// Extractor for group members - verifies the authenticated user holds an
/// active membership in the `{id}` group on the request path.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub user_id: i64,
    pub username: String,
    pub group_id: i64,
    pub membership_id: i64,
    pub role: Role,
}

impl GroupMember {
    pub fn is_admin_or_above(&self) -> bool {
        self.role >= Role::Admin
    }

    pub fn is_member_or_above(&self) -> bool {
        self.role >= Role::Member
    }
}

impl<S> FromRequestParts<S> for GroupMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_user = AuthUser::from_request_parts(parts, state).await?;

        #[derive(Deserialize)]
        struct GroupPath {
            id: i64,
        }

        let Path(group_path): Path<GroupPath> = parts
            .extract::<Path<GroupPath>>()
            .await
            .map_err(|_| AppError::BadRequest("Invalid group ID".to_string()))?;

        let group_id = group_path.id;

        let pool = parts
            .extensions
            .get::<SqlitePool>()
            .ok_or(AppError::Internal(
                "Database pool not configured".to_string(),
            ))?;

        let member: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, role FROM memberships
             WHERE group_id = ? AND user_id = ? AND status = 'active'",
        )
        .bind(group_id)
        .bind(auth_user.user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Database error: {}", e)))?;

        match member {
            Some((membership_id, role_str)) => {
                let role = role_str
                    .parse::<Role>()
                    .map_err(|_| AppError::Internal("Invalid role in database".to_string()))?;

                Ok(GroupMember {
                    user_id: auth_user.user_id,
                    username: auth_user.username,
                    group_id,
                    membership_id,
                    role,
                })
            }
            None => Err(AppError::NotFound(
                "Group not found or access denied".to_string(),
            )),
        }
    }
}

/// Require the owner or admin role within the group.
#[derive(Debug, Clone)]
pub struct AdminMember(pub GroupMember);

impl<S> FromRequestParts<S> for AdminMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let member = GroupMember::from_request_parts(parts, state).await?;

        if !member.is_admin_or_above() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminMember(member))
    }
}

/// Require member role or above - excludes read-only viewers from
/// write operations (creating expenses, recording settlements).
#[derive(Debug, Clone)]
pub struct MemberOrAbove(pub GroupMember);

impl<S> FromRequestParts<S> for MemberOrAbove
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let member = GroupMember::from_request_parts(parts, state).await?;

        if !member.is_member_or_above() {
            return Err(AppError::Forbidden(
                "Viewers cannot perform this action".to_string(),
            ));
        }

        Ok(MemberOrAbove(member))
    }
}

/// Require the group's owner specifically (ownership transfer, group deletion).
#[derive(Debug, Clone)]
pub struct OwnerMember(pub GroupMember);

impl<S> FromRequestParts<S> for OwnerMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let member = GroupMember::from_request_parts(parts, state).await?;

        if member.role != Role::Owner {
            return Err(AppError::Forbidden("Owner access required".to_string()));
        }

        Ok(OwnerMember(member))
    }
}
