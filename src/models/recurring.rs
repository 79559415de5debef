use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecurringRuleRow {
    pub id: i64,
    pub group_id: i64,
    pub creator_member_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub frequency: String,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub month_of_year: Option<i64>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub next_occurrence: String,
    pub last_generated_at: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecurringPayerRow {
    pub id: i64,
    pub recurring_rule_id: i64,
    pub member_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecurringSplitRow {
    pub id: i64,
    pub recurring_rule_id: i64,
    pub member_id: i64,
    pub share_mode: String,
    pub weight: Option<i64>,
    pub exact_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecurringSplitInput {
    pub member_id: i64,
    pub share_mode: super::expense::ShareMode,
    pub weight: Option<i64>,
    pub exact_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecurringPayerInput {
    pub member_id: i64,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecurringRule {
    pub name: String,
    pub category: Option<String>,
    pub amount: String,
    pub currency: String,
    pub frequency: Frequency,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub month_of_year: Option<i64>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub payers: Vec<RecurringPayerInput>,
    pub splits: Vec<RecurringSplitInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecurringRule {
    pub name: Option<String>,
    pub category: Option<String>,
    pub end_date: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecurringRuleResponse {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub amount: String,
    pub currency: String,
    pub frequency: String,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub month_of_year: Option<i64>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub next_occurrence: String,
    pub last_generated_at: Option<String>,
    pub is_active: bool,
}

/// Operational reporting for one `generateDue` sweep.
#[derive(Debug, Serialize, Default)]
pub struct SweepOutcome {
    pub rules_examined: usize,
    pub occurrences_generated: usize,
    pub rules_deactivated: usize,
    pub errors: Vec<String>,
}
