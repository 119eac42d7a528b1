use std::net::SocketAddr;

use axum::{http::HeaderValue, Router};
use tokio::net::TcpListener;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod db;
mod errors;
mod extract;
mod middleware;
mod models;
mod policy;
mod routes;
mod services;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = Config::from_env()?;
    tracing::info!(env = %config.app_env, "Starting BetYa backend");

    // ── Database ──────────────────────────────────────────────
    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;

    // ── Seed admin account ────────────────────────────────────
    auth::seed::seed_accounts(&pool, &config).await?;

    let addr: SocketAddr = format!("{}:{}", config.backend_host, config.backend_port).parse()?;
    let cors = cors_layer(&config);
    let app_state = AppState { pool, config };

    // ── Router ────────────────────────────────────────────────
    let app = Router::new()
        .nest("/api/v1", routes::all_routes(app_state.clone()))
        .layer(CookieManagerLayer::new())   // must come before state
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Permissive in development; otherwise only `CORS_ORIGINS`, with credentials.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.is_development() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
        .allow_credentials(true)
}
