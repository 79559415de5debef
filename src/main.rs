use axum::{extract::State, http::Method, middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bonscompte_backend::{
    auth::middleware::JwtSecret,
    config::Config,
    db, routes,
    services::{
        account_lifecycle,
        recurring_engine::{self, Clock, SystemClock},
        BalanceCache,
    },
    AppState,
};

/// Injects the JWT secret and database pool into request extensions so the
/// auth extractors (which run before any `State<AppState>` is available to
/// them) can reach both without threading `AppState` through every route.
async fn inject_extensions(
    State(state): State<AppState>,
    mut request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    request
        .extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    request.extensions_mut().insert(state.pool.clone());
    next.run(request).await
}

fn spawn_deletion_sweep(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(state.config.deletion_sweep_interval_seconds.max(1));
        loop {
            tokio::time::sleep(interval).await;

            match account_lifecycle::sweep(&state.pool, &account_lifecycle::SystemClock).await {
                Ok(outcome) if outcome.users_anonymized > 0 => {
                    tracing::info!(
                        users_examined = outcome.users_examined,
                        users_anonymized = outcome.users_anonymized,
                        "account deletion sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("account deletion sweep failed: {:?}", e),
            }
        }
    });
}

fn spawn_recurring_sweep(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(state.config.recurring_sweep_interval_seconds.max(1));
        loop {
            tokio::time::sleep(interval).await;

            let now = SystemClock.today();
            match recurring_engine::generate_due(&state.pool, &state.balance_cache, now).await {
                Ok(outcome) => {
                    if outcome.occurrences_generated > 0 || !outcome.errors.is_empty() {
                        tracing::info!(
                            rules_examined = outcome.rules_examined,
                            occurrences_generated = outcome.occurrences_generated,
                            rules_deactivated = outcome.rules_deactivated,
                            errors = ?outcome.errors,
                            "recurring sweep finished"
                        );
                    }
                }
                Err(e) => tracing::error!("recurring sweep failed: {:?}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bonscompte_backend=debug".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting BonsCompte backend...");

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Connected to SQLite at {}", config.database_url);

    let state = AppState {
        pool,
        jwt_secret: config.jwt_secret.clone(),
        balance_cache: BalanceCache::new(config.balance_cache_ttl_seconds),
        config: config.clone(),
    };

    spawn_recurring_sweep(state.clone());
    spawn_deletion_sweep(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    // Per-IP rate limiting on login/register; the rest of the API relies on
    // JWT auth and per-group authorization rather than IP-based throttling.
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.auth_rate_limit_per_second)
            .burst_size(config.auth_rate_limit_burst)
            .finish()
            .expect("invalid rate limit configuration"),
    );
    let auth_routes = routes::auth::router().layer(GovernorLayer {
        config: auth_governor_conf,
    });

    let group_scoped_routes = Router::new()
        .nest("/members", routes::members::router())
        .nest("/expenses", routes::expenses::router())
        .nest("/settlements", routes::settlements::router())
        .nest("/recurring", routes::recurring::router())
        .nest("/balances", routes::balances::router())
        .nest("/history", routes::history::router());

    let user_routes = Router::new()
        .merge(routes::users::router())
        .nest("/me/notifications", routes::notifications::router())
        .nest("/me/account", routes::account::router());

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/groups", routes::groups::router())
        .nest("/groups/{id}", group_scoped_routes)
        .nest("/admin", routes::admin::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_extensions,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
