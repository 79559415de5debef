use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Expense {
    pub id: i64,
    pub group_id: i64,
    pub creator_member_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub currency: String,
    /// Minor units; derived from the sum of item totals, stored for fast reads.
    pub subtotal: i64,
    pub expense_date: String,
    pub recurring_rule_id: Option<i64>,
    pub recurring_occurrence_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareMode {
    Equal,
    Weighted,
    Exact,
}

impl ShareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::Equal => "equal",
            ShareMode::Weighted => "weighted",
            ShareMode::Exact => "exact",
        }
    }
}

impl FromStr for ShareMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(ShareMode::Equal),
            "weighted" => Ok(ShareMode::Weighted),
            "exact" => Ok(ShareMode::Exact),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExpenseItemRow {
    pub id: i64,
    pub expense_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_value: i64,
    pub item_total: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExpenseItemMemberRow {
    pub id: i64,
    pub item_id: i64,
    pub member_id: i64,
    pub share_mode: String,
    pub weight: Option<i64>,
    pub exact_amount: Option<i64>,
    /// Computed and persisted at write time by the money kernel.
    pub computed_share: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExpensePayerRow {
    pub id: i64,
    pub expense_id: i64,
    pub member_id: i64,
    pub amount: i64,
}

/// Input DTOs for create/update. Amounts arrive as decimal strings on the
/// wire and are parsed to minor units by the money kernel at the boundary.

#[derive(Debug, Deserialize)]
pub struct SplitInput {
    pub member_id: i64,
    pub share_mode: ShareMode,
    pub weight: Option<i64>,
    pub exact_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub quantity: i64,
    pub unit_value: String,
    pub splits: Vec<SplitInput>,
}

#[derive(Debug, Deserialize)]
pub struct PayerInput {
    pub member_id: i64,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpense {
    pub name: String,
    pub category: Option<String>,
    pub currency: String,
    pub expense_date: String,
    pub items: Vec<ItemInput>,
    pub payers: Vec<PayerInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpense {
    pub name: String,
    pub category: Option<String>,
    pub expense_date: String,
    pub items: Vec<ItemInput>,
    pub payers: Vec<PayerInput>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseItemMemberResponse {
    pub member_id: i64,
    pub share_mode: String,
    pub weight: Option<i64>,
    pub exact_amount: Option<String>,
    pub computed_share: String,
}

#[derive(Debug, Serialize)]
pub struct ExpenseItemResponse {
    pub id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_value: String,
    pub item_total: String,
    pub splits: Vec<ExpenseItemMemberResponse>,
}

#[derive(Debug, Serialize)]
pub struct ExpensePayerResponse {
    pub member_id: i64,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: i64,
    pub group_id: i64,
    pub creator_member_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub currency: String,
    pub subtotal: String,
    pub expense_date: String,
    pub items: Vec<ExpenseItemResponse>,
    pub payers: Vec<ExpensePayerResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExpenseListQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub category: Option<String>,
    pub payer_member_id: Option<i64>,
}
