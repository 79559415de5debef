use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use sqlx::SqlitePool;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::SweepOutcome,
    services::{
        recurring_engine::{self, Clock, SystemClock},
        BalanceCache,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/generate-recurring", post(generate_recurring))
}

fn check_api_key(config: &Config, headers: &HeaderMap) -> AppResult<()> {
    let expected = config
        .admin_api_key
        .as_deref()
        .ok_or_else(|| AppError::Forbidden("Admin API key is not configured".to_string()))?;

    let provided = headers
        .get("x-admin-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized)?;

    if provided != expected {
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

async fn generate_recurring(
    State(pool): State<SqlitePool>,
    State(cache): State<BalanceCache>,
    State(config): State<Config>,
    headers: HeaderMap,
) -> AppResult<Json<SweepOutcome>> {
    check_api_key(&config, &headers)?;

    let now = SystemClock.today();
    let outcome = recurring_engine::generate_due(&pool, &cache, now).await?;

    Ok(Json(outcome))
}
