//! # cafe-directory
//!
//! A small web service for browsing, adding and retiring cafes, with account
//! registration and session login.
//!
//! ## Architecture
//!
//! - **Store**: SQLite `cafes` and `users` tables, schema created at startup
//! - **Forms**: required-field and URL checks for the signup, login and cafe forms
//! - **Sessions**: signed cookie holding a token into an in-memory session table
//! - **HTTP**: Axum router with rate limiting, request IDs, and graceful shutdown
//! - **Views**: pages go through a pluggable renderer; JSON endpoints bypass it

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod auth;
mod config;
mod forms;
mod http;
mod models;
mod store;
mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use cookie::Key;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli, SECRET_ENV};
use crate::http::{router, AppState, SessionStore};
use crate::store::Database;
use crate::views::SkeletonRenderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    info!(
        bind = %config.bind,
        database = %config.database.display(),
        session_ttl = %humantime::format_duration(config.session_ttl),
        admin_only_routes = ?config.admin_only_routes,
        "configuration loaded"
    );

    let cookie_key = match config.secret_key.as_deref() {
        Some(secret) => Key::derive_from(secret.as_bytes()),
        None => {
            warn!(
                env = SECRET_ENV,
                "no secret key configured; sessions will not survive a restart"
            );
            Key::generate()
        }
    };

    let db = Database::open(&config.database).with_context(|| {
        format!("failed to open database {}", config.database.display())
    })?;

    let state = AppState {
        db: Arc::new(db),
        sessions: SessionStore::new(config.session_ttl),
        cookie_key,
        renderer: Arc::new(SkeletonRenderer),
        admin_only_routes: Arc::new(config.admin_only_routes),
    };

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "cafe-directory listening");

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
        info!("shutting down gracefully");
    })
    .await
    .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
