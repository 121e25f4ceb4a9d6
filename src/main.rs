mod access;
mod auth;
mod config;
mod db;
mod error;
mod files;
mod handlers;
mod models;
mod routes;
mod texts;
mod users;
mod validate;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::Config::from_env()?;

    let conn = db::establish_connection(&cfg.database_path)
        .with_context(|| format!("open database {}", cfg.database_path))?;
    info!(path = %cfg.database_path, "database ready");

    let tokens = auth::TokenIssuer::new(cfg.access_token_secret.as_bytes())?;
    let state = routes::AppState::new(conn, tokens, cfg.public_base_url.clone(), cfg.bcrypt_cost);

    if cfg.require_auth {
        info!("bearer token required for mutating routes");
    }

    let app = routes::router(state, cfg.require_auth)
        .layer(build_cors(cfg.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!(%addr, base_url = %cfg.public_base_url, "server listening");
    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) if !o.split(',').any(|s| s.trim() == "*") => {
            let origins: Vec<HeaderValue> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        _ => cors.allow_origin(Any),
    }
}
