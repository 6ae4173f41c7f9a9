//! EventDesk Server - Main entry point.
//!
//! This binary starts the EventDesk API server with:
//! - Structured JSON logging
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background cleanup of expired login codes and idle rate limit entries
//!
//! # Configuration
//!
//! See [`eventdesk_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (ephemeral token key)
//! EVENTDESK_DEV_MODE=true cargo run --bin eventdesk-server
//!
//! # Production mode
//! EVENTDESK_TOKEN_KEY="base64-32-byte-seed" \
//! EVENTDESK_CORS_ORIGINS="https://app.example.com" \
//! PORT=8080 \
//! cargo run --release --bin eventdesk-server
//! ```

use std::process::ExitCode;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use eventdesk_server::config::Config;
use eventdesk_server::login_code::LoginCodeStore;
use eventdesk_server::rate_limit::RateLimiter;
use eventdesk_server::routes::{create_router, AppState};

/// Interval between sweeps of expired login codes.
const LOGIN_CODE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (unless dev mode):");
            eprintln!("  EVENTDESK_TOKEN_KEY            - Base64 32-byte Ed25519 seed");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                           - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                       - Log level filter (default: info)");
            eprintln!("  EVENTDESK_CORS_ORIGINS         - Comma-separated allowed origins");
            eprintln!("  EVENTDESK_TOKEN_TTL_SECS       - Token lifetime (default: 86400)");
            eprintln!("  EVENTDESK_LOGIN_CODE_TTL_SECS  - Login code lifetime (default: 600)");
            eprintln!("  EVENTDESK_SESSIONIZE_URL       - Sessionize API base URL");
            eprintln!("  EVENTDESK_DEV_MODE             - Ephemeral token key (dev only)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        dev_mode = config.dev_mode,
        cors_origin_count = config.cors_origins.len(),
        "EventDesk server starting"
    );

    let port = config.port;
    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "Failed to initialize application state");
            return ExitCode::from(1);
        }
    };

    let cleanup_handle =
        spawn_login_code_cleanup(state.login_codes.clone(), state.code_requests.clone());

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    cleanup_handle.abort();
    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Installs the JSON log subscriber. `RUST_LOG` overrides the default filter.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

fn spawn_login_code_cleanup(
    codes: std::sync::Arc<LoginCodeStore>,
    limiter: RateLimiter,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOGIN_CODE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = codes.cleanup_expired();
            if removed > 0 {
                debug!(removed, "Expired login codes removed");
            }
            limiter.cleanup_stale_entries().await;
        }
    })
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
