use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub label: Option<String>,
    pub owner_user_id: i64,
    pub join_code: String,
    pub default_currency: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub label: Option<String>,
    pub default_currency: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinGroup {
    pub join_code: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnership {
    pub target_user_id: i64,
}

/// A group as seen by one particular caller, annotated with their own role.
#[derive(Debug, Serialize)]
pub struct GroupWithRole {
    #[serde(flatten)]
    pub group: Group,
    pub role: String,
}
