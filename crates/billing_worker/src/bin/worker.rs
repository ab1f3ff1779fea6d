//! CRM Billing Worker Binary
//!
//! Connects to PostgreSQL, applies migrations and runs the billing jobs
//! until interrupted.
//!
//! # Usage
//!
//! ```bash
//! WORKER_DATABASE_URL=postgres://... \
//! WORKER_WHATSAPP_API_URL=https://gateway.example/messages \
//! WORKER_WHATSAPP_API_TOKEN=... \
//! cargo run --bin billing-worker
//! ```
//!
//! # Environment Variables
//!
//! * `WORKER_DATABASE_URL` - PostgreSQL connection string
//! * `WORKER_DATABASE_MAX_CONNECTIONS` / `WORKER_DATABASE_MIN_CONNECTIONS` - pool size (default: 10 / 1)
//! * `WORKER_DATABASE_CONNECT_TIMEOUT_SECS` - wait for a pooled connection (default: 30)
//! * `WORKER_TIMEZONE` - business timezone, IANA name (default: UTC)
//! * `WORKER_REMINDER_INTERVAL_SECS` - reminder sweep period (default: 3600)
//! * `WORKER_BUSINESS_HOURS_START` / `WORKER_BUSINESS_HOURS_END` - sending window (default: 9 / 18)
//! * `WORKER_SEND_AROUND_THE_CLOCK` - ignore the sending window (default: false)
//! * `WORKER_STATUS_INTERVAL_SECS` - status sweep period (default: 21600)
//! * `WORKER_NOTIFIER_TIMEOUT_SECS` - gateway call timeout (default: 5)
//! * `WORKER_WHATSAPP_API_URL`, `WORKER_WHATSAPP_API_TOKEN`, `WORKER_WHATSAPP_SENDER` - gateway settings
//! * `WORKER_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `WORKER_LOG_FORMAT` - pretty or json (default: pretty)

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_worker::{BillingServices, LogFormat, WhatsAppNotifier, WorkerConfig};
use core_kernel::{HealthCheckable, SystemClock};
use infra_db::{connect, PostgresBillingAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    init_tracing(&config.log_level, config.log_format);

    let scheduler_config = config.scheduler_config()?;
    tracing::info!(timezone = %scheduler_config.timezone, "Starting CRM billing worker");

    let pool = connect(&config.database_config())
        .await
        .context("connecting to billing database")?;

    let store = Arc::new(PostgresBillingAdapter::new(pool));
    let health = store.health_check().await;
    tracing::info!(status = ?health.status, latency_ms = health.latency_ms, "Billing store ready");

    let notifier = Arc::new(WhatsAppNotifier::new(config.whatsapp_config()?)?);
    let clock = Arc::new(SystemClock::new(scheduler_config.timezone));

    let services = BillingServices::wire(store, notifier, clock, config.notifier_timeout());
    let scheduler = services.start(scheduler_config);

    shutdown_signal().await;
    scheduler.shutdown().await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
