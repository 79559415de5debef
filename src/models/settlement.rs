use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Confirmed => "confirmed",
            SettlementStatus::Rejected => "rejected",
            SettlementStatus::Cancelled => "cancelled",
        }
    }

    /// All states except `Pending` are terminal: no further transition may
    /// mutate the row once reached.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }
}

impl FromStr for SettlementStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "confirmed" => Ok(SettlementStatus::Confirmed),
            "rejected" => Ok(SettlementStatus::Rejected),
            "cancelled" => Ok(SettlementStatus::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Settlement {
    pub id: i64,
    pub group_id: i64,
    pub payer_member_id: i64,
    pub payee_member_id: i64,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Settlement {
    pub fn status(&self) -> SettlementStatus {
        self.status.parse().unwrap_or(SettlementStatus::Pending)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSettlement {
    pub payer_member_id: i64,
    pub payee_member_id: i64,
    pub amount: String,
    pub currency: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectSettlement {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub id: i64,
    pub group_id: i64,
    pub payer_member_id: i64,
    pub payee_member_id: i64,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
