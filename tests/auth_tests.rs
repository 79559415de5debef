use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware, Router,
};
use bonscompte_backend::{
    auth::middleware::JwtSecret, config::Config, db, routes, services::BalanceCache, AppState,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

async fn inject_extensions(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: Request<Body>,
    next: middleware::Next,
) -> axum::response::Response {
    request
        .extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    request.extensions_mut().insert(state.pool.clone());
    next.run(request).await
}

/// Builds a router wired the same way `main.rs` wires it (auth routes plus
/// the extension-injection layer the JWT/pool extractors depend on).
async fn create_test_app() -> (Router, SqlitePool) {
    let pool = db::init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let jwt_secret = "test-secret-key-for-testing".to_string();
    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: jwt_secret.clone(),
        host: "127.0.0.1".to_string(),
        port: 8000,
        max_groups_per_user: None,
        balance_cache_ttl_seconds: 30,
        recurring_sweep_interval_seconds: 3600,
        deletion_sweep_interval_seconds: 21600,
        admin_api_key: None,
        auth_rate_limit_per_second: 2,
        auth_rate_limit_burst: 10,
    };

    let state = AppState {
        pool: pool.clone(),
        jwt_secret,
        balance_cache: BalanceCache::new(config.balance_cache_ttl_seconds),
        config,
    };

    let app = Router::new()
        .nest("/auth", routes::auth::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_extensions,
        ))
        .with_state(state);

    (app, pool)
}

async fn register(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "username": username,
                        "password": password,
                        "display_name": "Test User",
                        "email": format!("{username}@example.com"),
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap())
}

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "username": username,
                        "password": password,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap())
}

#[tokio::test]
async fn register_and_login_round_trip() {
    let (app, _pool) = create_test_app().await;

    let (status, body) = register(&app, "alice", "password123").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["display_name"], "Test User");
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = login(&app, "alice", "password123").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], "alice");
}

#[tokio::test]
async fn login_with_unknown_username_is_unauthorized() {
    let (app, _pool) = create_test_app().await;

    let (status, _body) = login(&app, "nobody", "whatever").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let (app, _pool) = create_test_app().await;

    register(&app, "bob", "correcthorse").await;
    let (status, _body) = login(&app, "bob", "wrongpassword").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let (app, _pool) = create_test_app().await;

    let (status, _) = register(&app, "carol", "password123").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = register(&app, "carol", "anotherpassword").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn password_too_short_is_rejected() {
    let (app, _pool) = create_test_app().await;

    let (status, _) = register(&app, "dave", "short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revoked_account_cannot_log_in() {
    let (app, pool) = create_test_app().await;

    register(&app, "erin", "password123").await;
    sqlx::query("UPDATE users SET user_state = 'revoked' WHERE username = 'erin'")
        .execute(&pool)
        .await
        .unwrap();

    let (status, _body) = login(&app, "erin", "password123").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
