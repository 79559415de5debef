use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    ExpenseAdded,
    SettlementRequested,
    SettlementConfirmed,
    SettlementRejected,
    GroupDeleted,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ExpenseAdded => "expense_added",
            NotificationType::SettlementRequested => "settlement_requested",
            NotificationType::SettlementConfirmed => "settlement_confirmed",
            NotificationType::SettlementRejected => "settlement_rejected",
            NotificationType::GroupDeleted => "group_deleted",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub notification_type: String,
    pub reference_type: String,
    pub reference_id: i64,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotificationListQuery {
    pub unread_only: Option<bool>,
}
