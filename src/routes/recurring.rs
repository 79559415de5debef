use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{GroupMember, MemberOrAbove},
    error::{AppError, AppResult},
    models::{CreateRecurringRule, RecurringRuleResponse, UpdateRecurringRule},
    money,
    services::history::HistoryService,
    AppState,
};

#[derive(Deserialize)]
struct RecurringPath {
    id: i64,
    rule_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rules).post(create_rule))
        .route("/{rule_id}", get(get_rule).put(update_rule).delete(delete_rule))
}

async fn group_currency(pool: &SqlitePool, group_id: i64) -> AppResult<String> {
    sqlx::query_scalar("SELECT default_currency FROM groups WHERE id = ? AND deleted_at IS NULL")
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
}

async fn fetch_response(pool: &SqlitePool, rule_id: i64) -> AppResult<RecurringRuleResponse> {
    let row: crate::models::RecurringRuleRow = sqlx::query_as("SELECT * FROM recurring_rules WHERE id = ?")
        .bind(rule_id)
        .fetch_one(pool)
        .await?;

    Ok(RecurringRuleResponse {
        id: row.id,
        group_id: row.group_id,
        name: row.name,
        category: row.category,
        amount: money::format_amount(row.amount, &row.currency),
        currency: row.currency,
        frequency: row.frequency,
        day_of_week: row.day_of_week,
        day_of_month: row.day_of_month,
        month_of_year: row.month_of_year,
        start_date: row.start_date,
        end_date: row.end_date,
        next_occurrence: row.next_occurrence,
        last_generated_at: row.last_generated_at,
        is_active: row.is_active,
    })
}

async fn list_rules(
    member: GroupMember,
    State(pool): State<SqlitePool>,
) -> AppResult<Json<Vec<RecurringRuleResponse>>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM recurring_rules WHERE group_id = ? ORDER BY id DESC",
    )
    .bind(member.group_id)
    .fetch_all(&pool)
    .await?;

    let mut rules = Vec::with_capacity(ids.len());
    for id in ids {
        rules.push(fetch_response(&pool, id).await?);
    }

    Ok(Json(rules))
}

async fn get_rule(
    member: GroupMember,
    State(pool): State<SqlitePool>,
    Path(RecurringPath { id: _, rule_id }): Path<RecurringPath>,
) -> AppResult<Json<RecurringRuleResponse>> {
    let belongs: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM recurring_rules WHERE id = ? AND group_id = ?",
    )
    .bind(rule_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    if belongs.is_none() {
        return Err(AppError::NotFound("Recurring rule not found".to_string()));
    }

    Ok(Json(fetch_response(&pool, rule_id).await?))
}

async fn create_rule(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    Json(input): Json<CreateRecurringRule>,
) -> AppResult<Json<RecurringRuleResponse>> {
    let member = member.0;
    let currency = group_currency(&pool, member.group_id).await?;
    money::same_currency(&input.currency, &currency)?;

    if input.payers.is_empty() || input.splits.is_empty() {
        return Err(AppError::BadRequest(
            "a recurring rule needs at least one payer and one split".to_string(),
        ));
    }

    let amount = money::parse_amount(&input.amount, &currency)?;
    let payer_total: i64 = input
        .payers
        .iter()
        .map(|p| money::parse_amount(&p.amount, &currency))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sum();
    if payer_total != amount {
        return Err(AppError::BadRequest(
            "payer amounts must sum to the rule amount".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO recurring_rules
         (group_id, creator_member_id, name, category, amount, currency, frequency,
          day_of_week, day_of_month, month_of_year, start_date, end_date, next_occurrence)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(member.group_id)
    .bind(member.membership_id)
    .bind(&input.name)
    .bind(&input.category)
    .bind(amount)
    .bind(&currency)
    .bind(input.frequency.as_str())
    .bind(input.day_of_week)
    .bind(input.day_of_month)
    .bind(input.month_of_year)
    .bind(&input.start_date)
    .bind(&input.end_date)
    .bind(&input.start_date)
    .execute(&mut *tx)
    .await?;

    let rule_id = result.last_insert_rowid();

    for payer in &input.payers {
        let payer_amount = money::parse_amount(&payer.amount, &currency)?;
        sqlx::query(
            "INSERT INTO recurring_payers (recurring_rule_id, member_id, amount) VALUES (?, ?, ?)",
        )
        .bind(rule_id)
        .bind(payer.member_id)
        .bind(payer_amount)
        .execute(&mut *tx)
        .await?;
    }

    for split in &input.splits {
        let exact_amount = match &split.exact_amount {
            Some(s) => Some(money::parse_amount(s, &currency)?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO recurring_splits (recurring_rule_id, member_id, share_mode, weight, exact_amount)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(rule_id)
        .bind(split.member_id)
        .bind(split.share_mode.as_str())
        .bind(split.weight)
        .bind(exact_amount)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let response = fetch_response(&pool, rule_id).await?;
    let _ = HistoryService::log_create(
        &pool,
        &correlation_id,
        member.user_id,
        member.group_id,
        crate::models::EntityType::RecurringRule,
        rule_id,
        &response,
    )
    .await;

    Ok(Json(response))
}

async fn update_rule(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    Path(RecurringPath { id: _, rule_id }): Path<RecurringPath>,
    Json(input): Json<UpdateRecurringRule>,
) -> AppResult<Json<RecurringRuleResponse>> {
    let member = member.0;

    let belongs: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM recurring_rules WHERE id = ? AND group_id = ?",
    )
    .bind(rule_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    if belongs.is_none() {
        return Err(AppError::NotFound("Recurring rule not found".to_string()));
    }

    let before = fetch_response(&pool, rule_id).await?;

    let name = input.name.unwrap_or(before.name.clone());
    let category = input.category.or(before.category.clone());
    let end_date = input.end_date.or(before.end_date.clone());
    let is_active = input.is_active.unwrap_or(before.is_active);

    sqlx::query(
        "UPDATE recurring_rules SET name = ?, category = ?, end_date = ?, is_active = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&category)
    .bind(&end_date)
    .bind(is_active)
    .bind(rule_id)
    .execute(&pool)
    .await?;

    let after = fetch_response(&pool, rule_id).await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_update(
        &pool,
        crate::services::history::LogUpdateParams {
            correlation_id: &correlation_id,
            actor_user_id: member.user_id,
            group_id: member.group_id,
            entity_type: crate::models::EntityType::RecurringRule,
            entity_id: rule_id,
            before: &before,
            after: &after,
        },
    )
    .await;

    Ok(Json(after))
}

async fn delete_rule(
    member: MemberOrAbove,
    State(pool): State<SqlitePool>,
    Path(RecurringPath { id: _, rule_id }): Path<RecurringPath>,
) -> AppResult<()> {
    let member = member.0;

    let before: Option<crate::models::RecurringRuleRow> = sqlx::query_as(
        "SELECT * FROM recurring_rules WHERE id = ? AND group_id = ?",
    )
    .bind(rule_id)
    .bind(member.group_id)
    .fetch_optional(&pool)
    .await?;

    let before = before.ok_or_else(|| AppError::NotFound("Recurring rule not found".to_string()))?;

    sqlx::query("UPDATE recurring_rules SET is_active = 0 WHERE id = ?")
        .bind(rule_id)
        .execute(&pool)
        .await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_delete(
        &pool,
        &correlation_id,
        member.user_id,
        member.group_id,
        crate::models::EntityType::RecurringRule,
        rule_id,
        &fetch_response(&pool, before.id).await?,
    )
    .await;

    Ok(())
}
