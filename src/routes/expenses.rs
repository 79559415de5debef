use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{GroupMember, MemberOrAbove},
    error::{AppError, AppResult},
    models::{CreateExpense, Expense, ExpenseListQuery, ExpenseResponse, UpdateExpense},
    services::{expense_service, BalanceCache},
    AppState,
};

#[derive(Deserialize)]
struct ExpensePath {
    id: i64,
    expense_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_expenses).post(create_expense))
        .route(
            "/{expense_id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

async fn group_currency(pool: &SqlitePool, group_id: i64) -> AppResult<String> {
    sqlx::query_scalar("SELECT default_currency FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
}

/// Editing/deleting an expense is restricted to its creator or a group
/// admin/owner - a plain member may create expenses but not touch others'.
async fn require_creator_or_admin(
    pool: &SqlitePool,
    member: &GroupMember,
    expense_id: i64,
) -> AppResult<()> {
    if member.is_admin_or_above() {
        return Ok(());
    }

    let creator_member_id: Option<i64> = sqlx::query_scalar(
        "SELECT creator_member_id FROM expenses WHERE id = ? AND group_id = ? AND deleted_at IS NULL",
    )
    .bind(expense_id)
    .bind(member.group_id)
    .fetch_optional(pool)
    .await?;

    match creator_member_id {
        Some(id) if id == member.membership_id => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "only the expense's creator or a group admin can modify it".to_string(),
        )),
        None => Err(AppError::NotFound("Expense not found".to_string())),
    }
}

async fn list_expenses(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Query(filter): Query<ExpenseListQuery>,
) -> AppResult<Json<Vec<Expense>>> {
    let mut sql = String::from(
        "SELECT * FROM expenses WHERE group_id = ? AND deleted_at IS NULL",
    );
    if filter.from_date.is_some() {
        sql.push_str(" AND expense_date >= ?");
    }
    if filter.to_date.is_some() {
        sql.push_str(" AND expense_date <= ?");
    }
    if filter.category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if filter.payer_member_id.is_some() {
        sql.push_str(" AND id IN (SELECT expense_id FROM expense_payers WHERE member_id = ?)");
    }
    sql.push_str(" ORDER BY expense_date DESC, id DESC");

    let mut query = sqlx::query_as::<_, Expense>(&sql).bind(member.group_id);
    if let Some(from) = &filter.from_date {
        query = query.bind(from);
    }
    if let Some(to) = &filter.to_date {
        query = query.bind(to);
    }
    if let Some(category) = &filter.category {
        query = query.bind(category);
    }
    if let Some(payer_member_id) = filter.payer_member_id {
        query = query.bind(payer_member_id);
    }

    let expenses = query.fetch_all(&pool).await?;
    Ok(Json(expenses))
}

async fn get_expense(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Path(ExpensePath { id: _, expense_id }): Path<ExpensePath>,
) -> AppResult<Json<ExpenseResponse>> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM expenses WHERE id = ? AND group_id = ? AND deleted_at IS NULL",
    )
    .bind(expense_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("Expense not found".to_string()));
    }

    Ok(Json(expense_service::fetch_expense_response(&pool, expense_id).await?))
}

async fn create_expense(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Json(input): Json<CreateExpense>,
) -> AppResult<Json<ExpenseResponse>> {
    let member = member.0;
    let currency = group_currency(&pool, member.group_id).await?;

    let response = expense_service::create_expense(
        &pool,
        &cache,
        member.group_id,
        member.membership_id,
        member.user_id,
        &currency,
        input,
    )
    .await?;

    Ok(Json(response))
}

async fn update_expense(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Path(ExpensePath { id: _, expense_id }): Path<ExpensePath>,
    Json(input): Json<UpdateExpense>,
) -> AppResult<Json<ExpenseResponse>> {
    let member = member.0;
    require_creator_or_admin(&pool, &member, expense_id).await?;
    let currency = group_currency(&pool, member.group_id).await?;

    let response = expense_service::update_expense(
        &pool,
        &cache,
        member.group_id,
        expense_id,
        member.user_id,
        &currency,
        input,
    )
    .await?;

    Ok(Json(response))
}

async fn delete_expense(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    Path(ExpensePath { id: _, expense_id }): Path<ExpensePath>,
) -> AppResult<()> {
    let member = member.0;
    require_creator_or_admin(&pool, &member, expense_id).await?;
    expense_service::delete_expense(&pool, &cache, member.group_id, expense_id, member.user_id).await
}
