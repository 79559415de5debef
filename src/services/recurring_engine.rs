//! Recurring-expense scheduler: computes each rule's next occurrence date
//! and materializes due occurrences as ordinary expenses. Idempotency comes
//! from the `(recurring_rule_id, recurring_occurrence_date)` unique index
//! on `expenses` (see `db::run_migrations`) rather than from any in-process
//! locking, so two workers racing the same occurrence have exactly one
//! insert succeed.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{
    EntityType, Frequency, ItemInput, RecurringRuleRow, ShareMode, SplitInput, SweepOutcome,
};
use crate::money;
use crate::services::balance_cache::BalanceCache;
use crate::services::expense_service::resolve_item_shares;
use crate::services::history::HistoryService;

/// Supplies "now" as a date, pulled out of the sweep so tests can drive the
/// engine across fabricated calendar boundaries without sleeping.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

fn parse_date(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Internal(format!("invalid stored date: {}", s)))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("month in 1..=12 always yields a valid first-of-month date");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("month in 1..=12 always yields a valid first-of-month date");
    (first_of_next - first_of_this).num_days() as u32
}

fn weekday_index(date: NaiveDate) -> i64 {
    // 0 = Sunday .. 6 = Saturday, matching the spec's dayOfWeek convention.
    use chrono::Datelike;
    match date.weekday() {
        chrono::Weekday::Sun => 0,
        chrono::Weekday::Mon => 1,
        chrono::Weekday::Tue => 2,
        chrono::Weekday::Wed => 3,
        chrono::Weekday::Thu => 4,
        chrono::Weekday::Fri => 5,
        chrono::Weekday::Sat => 6,
    }
}

fn snap_forward_to_weekday(mut date: NaiveDate, target_day_of_week: i64) -> NaiveDate {
    for _ in 0..7 {
        if weekday_index(date) == target_day_of_week {
            return date;
        }
        date += chrono::Duration::days(1);
    }
    date
}

/// Advances `current` by one period of `rule.frequency`, applying the
/// day-of-week/day-of-month/month-of-year clamp rules from the spec.
pub fn advance(current: NaiveDate, rule: &RecurringRuleRow) -> NaiveDate {
    use chrono::Datelike;

    let frequency: Frequency = rule.frequency.parse().unwrap_or(Frequency::Monthly);

    match frequency {
        Frequency::Daily => current + chrono::Duration::days(1),
        Frequency::Weekly => {
            let next = current + chrono::Duration::days(7);
            match rule.day_of_week {
                Some(dow) => snap_forward_to_weekday(next, dow),
                None => next,
            }
        }
        Frequency::Biweekly => {
            let next = current + chrono::Duration::days(14);
            match rule.day_of_week {
                Some(dow) => snap_forward_to_weekday(next, dow),
                None => next,
            }
        }
        Frequency::Monthly => {
            let total_months = current.year() as i64 * 12 + (current.month() as i64 - 1) + 1;
            let target_year = (total_months / 12) as i32;
            let target_month = (total_months % 12) as u32 + 1;
            let day = match rule.day_of_month {
                Some(dom) => (dom as u32).min(days_in_month(target_year, target_month)),
                None => current.day().min(days_in_month(target_year, target_month)),
            };
            NaiveDate::from_ymd_opt(target_year, target_month, day)
                .expect("clamped day is always valid for its target month")
        }
        Frequency::Yearly => {
            let target_year = current.year() + 1;
            let target_month = match rule.month_of_year {
                Some(m) => m as u32,
                None => current.month(),
            };
            let day = match rule.day_of_month {
                Some(dom) => (dom as u32).min(days_in_month(target_year, target_month)),
                None => current.day().min(days_in_month(target_year, target_month)),
            };
            NaiveDate::from_ymd_opt(target_year, target_month, day)
                .expect("clamped day is always valid for its target month")
        }
    }
}

struct LoadedRule {
    row: RecurringRuleRow,
    payers: Vec<(i64, i64)>,
    splits: Vec<SplitInput>,
}

async fn load_rule(pool: &SqlitePool, rule_id: i64) -> AppResult<LoadedRule> {
    let row: RecurringRuleRow = sqlx::query_as("SELECT * FROM recurring_rules WHERE id = ?")
        .bind(rule_id)
        .fetch_one(pool)
        .await?;

    let payer_rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT member_id, amount FROM recurring_payers WHERE recurring_rule_id = ?",
    )
    .bind(rule_id)
    .fetch_all(pool)
    .await?;

    let split_rows: Vec<(i64, String, Option<i64>, Option<i64>)> = sqlx::query_as(
        "SELECT member_id, share_mode, weight, exact_amount FROM recurring_splits WHERE recurring_rule_id = ?",
    )
    .bind(rule_id)
    .fetch_all(pool)
    .await?;

    let splits = split_rows
        .into_iter()
        .map(|(member_id, share_mode, weight, exact_amount)| SplitInput {
            member_id,
            share_mode: share_mode.parse::<ShareMode>().unwrap_or(ShareMode::Equal),
            weight,
            exact_amount: exact_amount.map(|a| money::format_amount(a, &row.currency)),
        })
        .collect();

    Ok(LoadedRule {
        payers: payer_rows,
        splits,
        row,
    })
}

/// Materializes a single occurrence as an ordinary expense row. Relies on
/// the unique `(recurring_rule_id, recurring_occurrence_date)` index to
/// make a duplicate attempt a no-op rather than a double-booked expense.
async fn materialize_occurrence(
    pool: &SqlitePool,
    rule: &LoadedRule,
    occurrence_date: NaiveDate,
) -> AppResult<bool> {
    let currency = rule.row.currency.clone();
    let item = ItemInput {
        name: rule.row.name.clone(),
        quantity: 1,
        unit_value: money::format_amount(rule.row.amount, &currency),
        splits: rule
            .splits
            .iter()
            .map(|s| SplitInput {
                member_id: s.member_id,
                share_mode: s.share_mode,
                weight: s.weight,
                exact_amount: s.exact_amount.clone(),
            })
            .collect(),
    };

    let shares = resolve_item_shares(&item, &currency)?;

    let payer_total: i64 = rule.payers.iter().map(|(_, a)| *a).sum();
    if payer_total != rule.row.amount {
        return Err(AppError::Internal(format!(
            "recurring rule {} payer amounts do not sum to its amount",
            rule.row.id
        )));
    }

    let mut tx = pool.begin().await?;

    let occurrence_str = occurrence_date.format("%Y-%m-%d").to_string();

    let insert_result = sqlx::query(
        "INSERT INTO expenses (group_id, creator_member_id, name, category, currency, subtotal, expense_date, recurring_rule_id, recurring_occurrence_date)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(rule.row.group_id)
    .bind(rule.row.creator_member_id)
    .bind(&rule.row.name)
    .bind(&rule.row.category)
    .bind(&currency)
    .bind(rule.row.amount)
    .bind(&occurrence_str)
    .bind(rule.row.id)
    .bind(&occurrence_str)
    .execute(&mut *tx)
    .await;

    let expense_id = match insert_result {
        Ok(result) => result.last_insert_rowid(),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            tx.rollback().await?;
            return Ok(false);
        }
        Err(e) => return Err(AppError::from(e)),
    };

    let item_result = sqlx::query(
        "INSERT INTO expense_items (expense_id, name, quantity, unit_value, item_total)
         VALUES (?, ?, 1, ?, ?)",
    )
    .bind(expense_id)
    .bind(&rule.row.name)
    .bind(rule.row.amount)
    .bind(rule.row.amount)
    .execute(&mut *tx)
    .await?;

    let item_id = item_result.last_insert_rowid();

    for (split, &share) in rule.splits.iter().zip(shares.iter()) {
        let exact_amount = match &split.exact_amount {
            Some(s) => Some(money::parse_amount(s, &currency)?),
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

    for &(member_id, amount) in &rule.payers {
        sqlx::query("INSERT INTO expense_payers (expense_id, member_id, amount) VALUES (?, ?, ?)")
            .bind(expense_id)
            .bind(member_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let correlation_id = HistoryService::new_correlation_id();
    let _ = HistoryService::log_event(
        pool,
        crate::services::history::LogEventParams {
            correlation_id: &correlation_id,
            actor_user_id: None,
            group_id: Some(rule.row.group_id),
            entity_type: EntityType::Expense.as_str(),
            entity_id: Some(expense_id),
            action: "CREATE",
            payload_before: None,
            payload_after: Some(&format!(
                "{{\"recurring_rule_id\":{},\"occurrence_date\":\"{}\"}}",
                rule.row.id, occurrence_str
            )),
            reason: Some("recurring_sweep"),
            undoes_history_id: None,
        },
    )
    .await;

    Ok(true)
}

/// Runs one sweep: selects every active, due rule and generates every
/// occurrence it owes up through `now`, one at a time, so a process that was
/// down for several periods catches up deterministically instead of
/// collapsing the gap into a single oversized expense.
pub async fn generate_due(
    pool: &SqlitePool,
    cache: &BalanceCache,
    now: NaiveDate,
) -> AppResult<SweepOutcome> {
    let mut outcome = SweepOutcome::default();

    let due_rule_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM recurring_rules WHERE is_active = 1 AND next_occurrence <= ?",
    )
    .bind(now.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    for rule_id in due_rule_ids {
        outcome.rules_examined += 1;

        if let Err(e) = process_rule(pool, cache, rule_id, now, &mut outcome).await {
            outcome.errors.push(format!("rule {}: {}", rule_id, e));
        }
    }

    Ok(outcome)
}

async fn process_rule(
    pool: &SqlitePool,
    cache: &BalanceCache,
    rule_id: i64,
    now: NaiveDate,
    outcome: &mut SweepOutcome,
) -> AppResult<()> {
    loop {
        let loaded = load_rule(pool, rule_id).await?;
        if !loaded.row.is_active {
            return Ok(());
        }

        let next_occurrence = parse_date(&loaded.row.next_occurrence)?;
        if next_occurrence > now {
            return Ok(());
        }

        // Spec §4.6 step 2 compares `endDate < now`; this compares against
        // `next_occurrence` (which is already known `<= now` at this point)
        // instead. The two differ only for an occurrence that falls after
        // `endDate` but on or before `now` - that occurrence is still
        // genuinely within the rule's active date range and materializing
        // it is correct, whereas comparing against `now` would skip a
        // legitimate final occurrence whenever the sweep runs late.
        if let Some(end_date) = &loaded.row.end_date {
            let end_date = parse_date(end_date)?;
            if end_date < next_occurrence {
                sqlx::query("UPDATE recurring_rules SET is_active = 0 WHERE id = ?")
                    .bind(rule_id)
                    .execute(pool)
                    .await?;
                outcome.rules_deactivated += 1;
                return Ok(());
            }
        }

        let generated = materialize_occurrence(pool, &loaded, next_occurrence).await?;
        if generated {
            outcome.occurrences_generated += 1;
            cache.invalidate(loaded.row.group_id).await;
        }

        let next = advance(next_occurrence, &loaded.row);
        sqlx::query(
            "UPDATE recurring_rules SET next_occurrence = ?, last_generated_at = ? WHERE id = ?",
        )
        .bind(next.format("%Y-%m-%d").to_string())
        .bind(now.format("%Y-%m-%d").to_string())
        .bind(rule_id)
        .execute(pool)
        .await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(frequency: Frequency, day_of_month: Option<i64>, month_of_year: Option<i64>) -> RecurringRuleRow {
        RecurringRuleRow {
            id: 1,
            group_id: 1,
            creator_member_id: 1,
            name: "Rent".to_string(),
            category: None,
            amount: 1000,
            currency: "USD".to_string(),
            frequency: frequency.as_str().to_string(),
            day_of_week: None,
            day_of_month,
            month_of_year,
            start_date: "2025-01-31".to_string(),
            end_date: None,
            next_occurrence: "2025-01-31".to_string(),
            last_generated_at: None,
            is_active: true,
        }
    }

    #[test]
    fn monthly_clamps_to_last_day_of_february() {
        let r = rule(Frequency::Monthly, Some(31), None);
        let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let next = advance(jan31, &r);
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());

        let next2 = advance(next, &r);
        assert_eq!(next2, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
    }

    #[test]
    fn daily_adds_one_day() {
        let r = rule(Frequency::Daily, None, None);
        let d = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(advance(d, &r), NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
    }

    #[test]
    fn yearly_clamps_leap_day() {
        let r = rule(Frequency::Yearly, Some(29), Some(2));
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let next = advance(d, &r);
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn weekly_snaps_to_day_of_week() {
        let mut r = rule(Frequency::Weekly, None, None);
        r.day_of_week = Some(1); // Monday
        let sunday = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(weekday_index(sunday), 0);
        let next = advance(sunday, &r);
        assert_eq!(weekday_index(next), 1);
    }
}
