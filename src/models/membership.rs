use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Role hierarchy, descending: owner > admin > member > viewer. Derives
/// `PartialOrd`/`Ord` from declaration order so `role >= Role::Member`
/// reads naturally at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            _ => Err(()),
        }
    }
}

/// Membership status. `Active` participates in balances; `Left` is a
/// soft-removed row kept around so rejoin reactivates it in place instead of
/// inserting a second row for the same (group, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Active,
    Left,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Left => "left",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "left" => Ok(MembershipStatus::Left),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MembershipRow {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub role: String,
    pub status: String,
    pub joined_at: String,
    pub left_at: Option<String>,
}

#[derive(Debug, FromRow, Serialize)]
pub struct MemberResponse {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
    pub status: String,
    pub joined_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRole {
    pub role: Role,
}

/// A member identity as carried through the balance engine: the triple of
/// ids/names needed to label both endpoints of a debt edge without a second
/// round-trip to the users table.
#[derive(Debug, Clone, Serialize)]
pub struct MemberIdentity {
    pub member_id: i64,
    pub user_id: i64,
    pub display_name: String,
}
