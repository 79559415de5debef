use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        Expense, HistoryEntry, MembershipRow, RequestAccountDeletion, Settlement, User,
        UserResponse,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deletion", post(request_deletion).delete(cancel_deletion))
        .route("/export", get(export_account))
}

#[derive(Debug, Serialize)]
struct AccountExport {
    profile: UserResponse,
    memberships: Vec<MembershipRow>,
    expenses: Vec<Expense>,
    settlements: Vec<Settlement>,
    recent_activity: Vec<HistoryEntry>,
}

async fn request_deletion(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
    Json(input): Json<RequestAccountDeletion>,
) -> AppResult<()> {
    if !input.confirm {
        return Err(AppError::BadRequest(
            "Account deletion must be explicitly confirmed".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE users SET deletion_requested_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(auth.user_id)
    .execute(&pool)
    .await?;

    Ok(())
}

async fn cancel_deletion(auth: AuthUser, State(pool): State<SqlitePool>) -> AppResult<()> {
    sqlx::query("UPDATE users SET deletion_requested_at = NULL WHERE id = ?")
        .bind(auth.user_id)
        .execute(&pool)
        .await?;

    Ok(())
}

async fn export_account(
    auth: AuthUser,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<AccountExport>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let memberships: Vec<MembershipRow> =
        sqlx::query_as("SELECT * FROM memberships WHERE user_id = ? ORDER BY id")
            .bind(auth.user_id)
            .fetch_all(&pool)
            .await?;

    let member_ids: Vec<i64> = memberships.iter().map(|m| m.id).collect();

    let expenses = if member_ids.is_empty() {
        Vec::new()
    } else {
        let placeholders = member_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM expenses WHERE deleted_at IS NULL AND id IN (
                SELECT expense_id FROM expense_payers WHERE member_id IN ({placeholders})
                UNION
                SELECT e.id FROM expenses e
                JOIN expense_items i ON i.expense_id = e.id
                JOIN expense_item_members s ON s.item_id = i.id
                WHERE s.member_id IN ({placeholders})
            ) ORDER BY expense_date DESC, id DESC LIMIT 1000"
        );
        let mut query = sqlx::query_as::<_, Expense>(&sql);
        for id in &member_ids {
            query = query.bind(id);
        }
        for id in &member_ids {
            query = query.bind(id);
        }
        query.fetch_all(&pool).await?
    };

    let settlements = if member_ids.is_empty() {
        Vec::new()
    } else {
        let placeholders = member_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM settlements WHERE payer_member_id IN ({placeholders})
             OR payee_member_id IN ({placeholders}) ORDER BY id DESC LIMIT 1000"
        );
        let mut query = sqlx::query_as::<_, Settlement>(&sql);
        for id in &member_ids {
            query = query.bind(id);
        }
        for id in &member_ids {
            query = query.bind(id);
        }
        query.fetch_all(&pool).await?
    };

    let recent_activity: Vec<HistoryEntry> = sqlx::query_as(
        "SELECT * FROM history_log WHERE actor_user_id = ? ORDER BY id DESC LIMIT 1000",
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(AccountExport {
        profile: UserResponse::from(user),
        memberships,
        expenses,
        settlements,
        recent_activity,
    }))
}
