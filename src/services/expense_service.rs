//! Expense create/update/soft-delete: resolves each item's split into
//! per-member minor-unit shares via the money kernel, persists the result
//! atomically, and fans out the side effects (history log, balance cache
//! invalidation, notifications) that every mutation must trigger.

use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateExpense, EntityType, Expense, ExpenseItemMemberResponse, ExpenseItemResponse,
    ExpensePayerResponse, ExpenseResponse, ItemInput, NotificationType, PayerInput,
    UpdateExpense,
};
use crate::money;
use crate::services::balance_cache::BalanceCache;
use crate::services::history::HistoryService;
use crate::services::notification_service;

pub(crate) fn resolve_item_shares(item: &ItemInput, currency: &str) -> AppResult<Vec<i64>> {
    let unit_value = money::parse_amount(&item.unit_value, currency)?;
    let item_total = unit_value * item.quantity;

    let exact_members: Vec<usize> = item
        .splits
        .iter()
        .enumerate()
        .filter(|(_, s)| s.share_mode == crate::models::ShareMode::Exact)
        .map(|(i, _)| i)
        .collect();

    if exact_members.is_empty() {
        let weights: Vec<i64> = item
            .splits
            .iter()
            .map(|s| s.weight.unwrap_or(1))
            .collect();
        return Ok(money::split_weighted(item_total, &weights)?);
    }

    let mut exact_sum = 0i64;
    let mut exact_amounts = vec![0i64; item.splits.len()];
    for &i in &exact_members {
        let amount = money::parse_amount(
            item.splits[i]
                .exact_amount
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("exact split missing amount".to_string()))?,
            currency,
        )?;
        exact_sum += amount;
        exact_amounts[i] = amount;
    }

    let other_indices: Vec<usize> = (0..item.splits.len())
        .filter(|i| !exact_members.contains(i))
        .collect();
    let other_weights: Vec<i64> = other_indices
        .iter()
        .map(|&i| item.splits[i].weight.unwrap_or(1))
        .collect();

    let residual_shares = if other_indices.is_empty() {
        Vec::new()
    } else {
        money::split_exact_plus_remainder(item_total, exact_sum, &other_weights)?
    };

    let mut shares = exact_amounts;
    for (slot, &i) in other_indices.iter().enumerate() {
        shares[i] = residual_shares[slot];
    }

    Ok(shares)
}

struct ResolvedItem<'a> {
    input: &'a ItemInput,
    unit_value: i64,
    item_total: i64,
    shares: Vec<i64>,
}

fn resolve_items<'a>(items: &'a [ItemInput], currency: &str) -> AppResult<Vec<ResolvedItem<'a>>> {
    items
        .iter()
        .map(|item| {
            let unit_value = money::parse_amount(&item.unit_value, currency)?;
            let item_total = unit_value * item.quantity;
            let shares = resolve_item_shares(item, currency)?;
            Ok(ResolvedItem {
                input: item,
                unit_value,
                item_total,
                shares,
            })
        })
        .collect()
}

fn resolve_payers(payers: &[PayerInput], currency: &str) -> AppResult<Vec<(i64, i64)>> {
    payers
        .iter()
        .map(|p| Ok((p.member_id, money::parse_amount(&p.amount, currency)?)))
        .collect()
}

/// Every payer and every split member referenced by an expense must be an
/// active membership of the group the expense belongs to.
async fn require_active_members(
    pool: &SqlitePool,
    group_id: i64,
    member_ids: &[i64],
) -> AppResult<()> {
    for &member_id in member_ids {
        let active: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM memberships WHERE id = ? AND group_id = ? AND status = 'active'",
        )
        .bind(member_id)
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        if active.is_none() {
            return Err(AppError::BadRequest(format!(
                "member {member_id} is not an active member of this group"
            )));
        }
    }
    Ok(())
}

fn referenced_member_ids(items: &[ItemInput], payers: &[PayerInput]) -> Vec<i64> {
    let mut ids: Vec<i64> = items
        .iter()
        .flat_map(|item| item.splits.iter().map(|s| s.member_id))
        .chain(payers.iter().map(|p| p.member_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub async fn create_expense(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    creator_member_id: i64,
    actor_user_id: i64,
    group_currency: &str,
    input: CreateExpense,
) -> AppResult<ExpenseResponse> {
    money::same_currency(&input.currency, group_currency)?;

    if input.items.is_empty() {
        return Err(AppError::BadRequest("expense must have at least one item".to_string()));
    }
    if input.payers.is_empty() {
        return Err(AppError::BadRequest("expense must have at least one payer".to_string()));
    }

    require_active_members(
        pool,
        group_id,
        &referenced_member_ids(&input.items, &input.payers),
    )
    .await?;

    let resolved_items = resolve_items(&input.items, &input.currency)?;
    let payers = resolve_payers(&input.payers, &input.currency)?;

    let subtotal: i64 = resolved_items.iter().map(|r| r.item_total).sum();
    let payer_total: i64 = payers.iter().map(|(_, amount)| amount).sum();
    if payer_total != subtotal {
        return Err(AppError::BadRequest(format!(
            "payer amounts ({}) must sum to the expense subtotal ({})",
            money::format_amount(payer_total, &input.currency),
            money::format_amount(subtotal, &input.currency),
        )));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO expenses (group_id, creator_member_id, name, category, currency, subtotal, expense_date)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(group_id)
    .bind(creator_member_id)
    .bind(&input.name)
    .bind(&input.category)
    .bind(&input.currency)
    .bind(subtotal)
    .bind(&input.expense_date)
    .execute(&mut *tx)
    .await?;

    let expense_id = result.last_insert_rowid();

    for resolved in &resolved_items {
        let item_result = sqlx::query(
            "INSERT INTO expense_items (expense_id, name, quantity, unit_value, item_total)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(expense_id)
        .bind(&resolved.input.name)
        .bind(resolved.input.quantity)
        .bind(resolved.unit_value)
        .bind(resolved.item_total)
        .execute(&mut *tx)
        .await?;

        let item_id = item_result.last_insert_rowid();

        for (split, &share) in resolved.input.splits.iter().zip(resolved.shares.iter()) {
            let exact_amount = match &split.exact_amount {
                Some(s) => Some(money::parse_amount(s, &input.currency)?),
                None => None,
            };
            sqlx::query(
                "INSERT INTO expense_item_members (item_id, member_id, share_mode, weight, exact_amount, computed_share)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(item_id)
            .bind(split.member_id)
            .bind(split.share_mode.as_str())
            .bind(split.weight)
            .bind(exact_amount)
            .bind(share)
            .execute(&mut *tx)
            .await?;
        }
    }

    for (member_id, amount) in &payers {
        sqlx::query(
            "INSERT INTO expense_payers (expense_id, member_id, amount) VALUES (?, ?, ?)",
        )
        .bind(expense_id)
        .bind(member_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;
    }

    let expense: Expense = sqlx::query_as("SELECT * FROM expenses WHERE id = ?")
        .bind(expense_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_create(
        pool,
        &correlation_id,
        actor_user_id,
        group_id,
        EntityType::Expense,
        expense_id,
        &expense,
    )
    .await;

    cache.invalidate(group_id).await;

    let member_ids: Vec<i64> = resolved_items
        .iter()
        .flat_map(|r| r.input.splits.iter().map(|s| s.member_id))
        .collect();
    notification_service::notify_group_members(
        pool,
        group_id,
        &member_ids,
        creator_member_id,
        NotificationType::ExpenseAdded,
        "expense",
        expense_id,
        Some(subtotal),
        Some(&input.currency),
    )
    .await?;

    fetch_expense_response(pool, expense_id).await
}

pub async fn update_expense(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    expense_id: i64,
    actor_user_id: i64,
    currency: &str,
    input: UpdateExpense,
) -> AppResult<ExpenseResponse> {
    let before: Expense = sqlx::query_as(
        "SELECT * FROM expenses WHERE id = ? AND group_id = ? AND deleted_at IS NULL",
    )
    .bind(expense_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Expense not found".to_string()))?;

    require_active_members(
        pool,
        group_id,
        &referenced_member_ids(&input.items, &input.payers),
    )
    .await?;

    let resolved_items = resolve_items(&input.items, currency)?;
    let payers = resolve_payers(&input.payers, currency)?;

    let subtotal: i64 = resolved_items.iter().map(|r| r.item_total).sum();
    let payer_total: i64 = payers.iter().map(|(_, amount)| amount).sum();
    if payer_total != subtotal {
        return Err(AppError::BadRequest(
            "payer amounts must sum to the expense subtotal".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE expenses SET name = ?, category = ?, subtotal = ?, expense_date = ?,
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
    )
    .bind(&input.name)
    .bind(&input.category)
    .bind(subtotal)
    .bind(&input.expense_date)
    .bind(expense_id)
    .execute(&mut *tx)
    .await?;

    // Simplest correct strategy for replacing a nested item/split/payer tree:
    // delete the old rows and reinsert. Expense rows carry no foreign keys
    // pointing *into* items/splits, so nothing else references them by id.
    let old_item_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM expense_items WHERE expense_id = ?")
            .bind(expense_id)
            .fetch_all(&mut *tx)
            .await?;
    for item_id in &old_item_ids {
        sqlx::query("DELETE FROM expense_item_members WHERE item_id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM expense_items WHERE expense_id = ?")
        .bind(expense_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM expense_payers WHERE expense_id = ?")
        .bind(expense_id)
        .execute(&mut *tx)
        .await?;

    for resolved in &resolved_items {
        let item_result = sqlx::query(
            "INSERT INTO expense_items (expense_id, name, quantity, unit_value, item_total)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(expense_id)
        .bind(&resolved.input.name)
        .bind(resolved.input.quantity)
        .bind(resolved.unit_value)
        .bind(resolved.item_total)
        .execute(&mut *tx)
        .await?;

        let item_id = item_result.last_insert_rowid();

        for (split, &share) in resolved.input.splits.iter().zip(resolved.shares.iter()) {
            let exact_amount = match &split.exact_amount {
                Some(s) => Some(money::parse_amount(s, currency)?),
                None => None,
            };
            sqlx::query(
                "INSERT INTO expense_item_members (item_id, member_id, share_mode, weight, exact_amount, computed_share)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(item_id)
            .bind(split.member_id)
            .bind(split.share_mode.as_str())
            .bind(split.weight)
            .bind(exact_amount)
            .bind(share)
            .execute(&mut *tx)
            .await?;
        }
    }

    for (member_id, amount) in &payers {
        sqlx::query(
            "INSERT INTO expense_payers (expense_id, member_id, amount) VALUES (?, ?, ?)",
        )
        .bind(expense_id)
        .bind(member_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;
    }

    let after: Expense = sqlx::query_as("SELECT * FROM expenses WHERE id = ?")
        .bind(expense_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_update(
        pool,
        crate::services::history::LogUpdateParams {
            correlation_id: &correlation_id,
            actor_user_id,
            group_id,
            entity_type: EntityType::Expense,
            entity_id: expense_id,
            before: &before,
            after: &after,
        },
    )
    .await;

    cache.invalidate(group_id).await;

    fetch_expense_response(pool, expense_id).await
}

pub async fn delete_expense(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    expense_id: i64,
    actor_user_id: i64,
) -> AppResult<()> {
    let expense: Expense = sqlx::query_as(
        "SELECT * FROM expenses WHERE id = ? AND group_id = ? AND deleted_at IS NULL",
    )
    .bind(expense_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Expense not found".to_string()))?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE expenses SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
    )
    .bind(expense_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_delete(
        pool,
        &correlation_id,
        actor_user_id,
        group_id,
        EntityType::Expense,
        expense_id,
        &expense,
    )
    .await;

    cache.invalidate(group_id).await;

    Ok(())
}

pub async fn fetch_expense_response(pool: &SqlitePool, expense_id: i64) -> AppResult<ExpenseResponse> {
    let expense: Expense = sqlx::query_as("SELECT * FROM expenses WHERE id = ?")
        .bind(expense_id)
        .fetch_one(pool)
        .await?;

    let item_rows: Vec<crate::models::ExpenseItemRow> =
        sqlx::query_as("SELECT * FROM expense_items WHERE expense_id = ? ORDER BY id")
            .bind(expense_id)
            .fetch_all(pool)
            .await?;

    let mut items = Vec::with_capacity(item_rows.len());
    for item in item_rows {
        let split_rows: Vec<crate::models::ExpenseItemMemberRow> =
            sqlx::query_as("SELECT * FROM expense_item_members WHERE item_id = ? ORDER BY id")
                .bind(item.id)
                .fetch_all(pool)
                .await?;

        let splits = split_rows
            .into_iter()
            .map(|s| ExpenseItemMemberResponse {
                member_id: s.member_id,
                share_mode: s.share_mode,
                weight: s.weight,
                exact_amount: s
                    .exact_amount
                    .map(|a| money::format_amount(a, &expense.currency)),
                computed_share: money::format_amount(s.computed_share, &expense.currency),
            })
            .collect();

        items.push(ExpenseItemResponse {
            id: item.id,
            name: item.name,
            quantity: item.quantity,
            unit_value: money::format_amount(item.unit_value, &expense.currency),
            item_total: money::format_amount(item.item_total, &expense.currency),
            splits,
        });
    }

    let payer_rows: Vec<crate::models::ExpensePayerRow> =
        sqlx::query_as("SELECT * FROM expense_payers WHERE expense_id = ? ORDER BY id")
            .bind(expense_id)
            .fetch_all(pool)
            .await?;

    let payers = payer_rows
        .into_iter()
        .map(|p| ExpensePayerResponse {
            member_id: p.member_id,
            amount: money::format_amount(p.amount, &expense.currency),
        })
        .collect();

    Ok(ExpenseResponse {
        id: expense.id,
        group_id: expense.group_id,
        creator_member_id: expense.creator_member_id,
        name: expense.name,
        category: expense.category,
        currency: expense.currency.clone(),
        subtotal: money::format_amount(expense.subtotal, &expense.currency),
        expense_date: expense.expense_date,
        items,
        payers,
        created_at: expense.created_at,
        updated_at: expense.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ShareMode, SplitInput};

    fn split(member_id: i64) -> SplitInput {
        SplitInput {
            member_id,
            share_mode: ShareMode::Equal,
            weight: None,
            exact_amount: None,
        }
    }

    #[test]
    fn resolve_item_shares_equal_split_sums_to_total() {
        let item = ItemInput {
            name: "Dinner".to_string(),
            quantity: 1,
            unit_value: "10.00".to_string(),
            splits: vec![split(1), split(2), split(3)],
        };
        let shares = resolve_item_shares(&item, "USD").unwrap();
        assert_eq!(shares, vec![334, 333, 333]);
    }

    #[test]
    fn resolve_item_shares_exact_plus_remainder() {
        let item = ItemInput {
            name: "Groceries".to_string(),
            quantity: 1,
            unit_value: "20.00".to_string(),
            splits: vec![
                SplitInput {
                    member_id: 1,
                    share_mode: ShareMode::Exact,
                    weight: None,
                    exact_amount: Some("8.00".to_string()),
                },
                split(2),
                split(3),
            ],
        };
        let shares = resolve_item_shares(&item, "USD").unwrap();
        assert_eq!(shares.iter().sum::<i64>(), 2000);
        assert_eq!(shares[0], 800);
    }
}
