use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    /// Maximum groups per user (None = unlimited, Some(n) = n groups)
    pub max_groups_per_user: Option<i64>,
    /// How long a computed balance snapshot stays valid before recomputation.
    pub balance_cache_ttl_seconds: u64,
    /// How often the recurring-expense sweep runs in the background.
    pub recurring_sweep_interval_seconds: u64,
    /// How often the account-deletion grace-period sweep runs in the background.
    pub deletion_sweep_interval_seconds: u64,
    /// Shared secret gating `src/bin/admin.rs` CLI operations.
    pub admin_api_key: Option<String>,
    /// Steady-state requests/second allowed per client IP on `/auth` routes.
    pub auth_rate_limit_per_second: u64,
    /// Burst allowance on top of the steady-state rate for `/auth` routes.
    pub auth_rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let max_groups_per_user = env::var("MAX_GROUPS_PER_USER")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|&n| n > 0);

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/bonscompte.db".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-in-production".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("PORT must be a number"),
            max_groups_per_user,
            balance_cache_ttl_seconds: env::var("BALANCE_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            recurring_sweep_interval_seconds: env::var("RECURRING_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            deletion_sweep_interval_seconds: env::var("DELETION_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(21600),
            admin_api_key: env::var("ADMIN_API_KEY").ok(),
            auth_rate_limit_per_second: env::var("AUTH_RATE_LIMIT_PER_SECOND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            auth_rate_limit_burst: env::var("AUTH_RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}
