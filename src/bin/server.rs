// Explora - API Server
// Serves location context and runs image generation jobs in-process
// Run with: cargo run --bin server

//! # Explora Server Binary
//!
//! Starts the HTTP API together with the background job dispatcher.
//!
//! ```text
//! main()
//!   ↓ loads
//! AppConfig (defaults → .env → EXPLORA__* environment)
//!   ↓ wires
//! Services (storage + generation job)
//!   ↓ starts
//! Dispatcher (worker pool, retries, dead letters)
//!   ↓ serves
//! ApiServer (axum)
//! ```
//!
//! ## Rust Learning Notes:
//!
//! ### `anyhow::Result` in `main`
//! Binaries rarely need to match on error variants, so `main` returns
//! `anyhow::Result<()>` and every library error converts through `?`.

use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use explora::api::JwtKeys;
use explora::app::Services;
use explora::{ApiServerBuilder, AppConfig, AppState, Dispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly
    if let Err(e) = dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    let config = AppConfig::load().context("failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting Explora Server...");
    info!("=====================================");
    info!("Server: {}", config.bind_address());
    info!("Log Level: {}", config.log_level);

    let secret = config.require_jwt_secret()?.to_string();
    let services = Services::from_config(&config).await?;

    let dispatcher = Arc::new(Dispatcher::start(
        services.job.clone(),
        config.dispatcher_config(),
    ));
    info!(
        "⚙️  Dispatcher started: {} concurrent jobs, {} attempts per job",
        config.jobs.max_concurrent_jobs,
        services.job.policy().max_attempts
    );

    let state = AppState::new(
        services.locations,
        services.media,
        services.users,
        dispatcher,
        JwtKeys::new(&secret, config.auth.token_ttl_hours),
        config.jobs.trigger_radius_meters,
        config.jobs.context_radius_meters,
    );

    ApiServerBuilder::new()
        .with_host(config.server.host.clone())
        .with_port(config.server.port)
        .with_cors(config.server.cors_enabled)
        .with_state(state)
        .build()?
        .run()
        .await?;

    Ok(())
}
