//! Salesforce Connector - API Server Binary
//!
//! This binary starts the HTTP server exposing Salesforce objects as record
//! feeds and write endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin salesforce-connector
//!
//! # Run with environment variables
//! PORT=5000 LOGIN_CONFIG='{"USERNAME": "...", "PASSWORD": "...", "SECURITY_TOKEN": "..."}' \
//!     cargo run --bin salesforce-connector
//! ```
//!
//! # Environment Variables
//!
//! * `HOST`, `PORT` - Bind address (default: 0.0.0.0:5000)
//! * `LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_VERSION` - Salesforce API version (default: 52.0)
//! * `DEFAULT_BULK_SWITCH_THRESHOLD` - Write size above which the bulk API is used; 0 disables
//! * `SALESFORCE_SERVICE_REFRESHED_AT_INTERVAL` - Session refresh interval in minutes (default: 45)
//! * `SF_OBJECTS_CONFIG` - Per-datatype key fields and bulk thresholds (JSON)
//! * `VALUESET_LIST` - Value set alias to tooling path mapping (JSON)
//! * `USERNAME`, `PASSWORD`, `SECURITY_TOKEN` - Default credentials
//! * `LOGIN_CONFIG` - Default credentials as JSON, preferred over the triple above
//! * `INSTANCE` - `prod` or `sandbox` (default: prod)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use domain_sync::{SessionManager, SyncService};
use infra_salesforce::SalesforceConnector;
use interface_api::{config::ConnectorConfig, create_router};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the connector.
///
/// Initializes logging, loads configuration, wires the sync service to the
/// Salesforce transport and starts the HTTP server.
///
/// # Errors
///
/// Returns an error if:
/// - A JSON configuration document cannot be parsed
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config();

    init_tracing(&config.log_level);

    let defaults = config.credential_defaults()?;
    tracing::info!(
        host = %config.host,
        port = %config.port,
        instance = %config.instance(),
        username = ?defaults.default_username(),
        "Starting Salesforce connector"
    );

    let connector = SalesforceConnector::new(config.salesforce())?;
    let sessions = SessionManager::new(Arc::new(connector), defaults, config.refresh_interval());
    let registry = config
        .registry()
        .context("invalid SF_OBJECTS_CONFIG")?;
    let aliases = config
        .value_set_aliases()
        .context("invalid VALUESET_LIST")?;
    let sync = Arc::new(SyncService::new(sessions, registry, aliases));

    let app = create_router(sync, config.clone());

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads connector configuration from environment variables.
///
/// Falls back to the defaults when the environment cannot be read.
fn load_config() -> ConnectorConfig {
    ConnectorConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid connector configuration, using defaults: {}", e);
        ConnectorConfig::default()
    })
}

/// Initializes the tracing subscriber for structured logging.
///
/// # Arguments
///
/// * `log_level` - The minimum log level to output (trace, debug, info, warn, error)
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
