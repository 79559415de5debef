use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Lifecycle state of a user account. New registrations land in
/// `PendingApproval` on deployments that require an admin to approve new
/// accounts before they can act; most deployments leave this unused and
/// registrations are created `Active` directly (see `Config::auto_approve_users`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserState {
    #[default]
    Active,
    PendingApproval,
    Revoked,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::PendingApproval => "pending_approval",
            UserState::Revoked => "revoked",
        }
    }
}

impl FromStr for UserState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserState::Active),
            "pending_approval" => Ok(UserState::PendingApproval),
            "revoked" => Ok(UserState::Revoked),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub user_state: String,
    pub token_version: i64,
    pub deletion_requested_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn state(&self) -> UserState {
        self.user_state.parse().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RequestAccountDeletion {
    pub confirm: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_state_round_trips_through_str() {
        for state in [UserState::Active, UserState::PendingApproval, UserState::Revoked] {
            assert_eq!(state.as_str().parse::<UserState>().unwrap(), state);
        }
    }
}
