pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod routes;
pub mod services;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use config::Config;
use services::BalanceCache;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt_secret: String,
    pub balance_cache: BalanceCache,
    pub config: Config,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for String {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_secret.clone()
    }
}

impl FromRef<AppState> for BalanceCache {
    fn from_ref(state: &AppState) -> Self {
        state.balance_cache.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
