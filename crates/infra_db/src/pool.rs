//! Connection pool for the billing store
//!
//! The worker holds one pool for its whole lifetime. Jobs run one at a time
//! per kind, so the pool stays small; connections are recycled periodically
//! so a failover of the primary is picked up without a restart.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::DatabaseError;

/// Type alias for the PostgreSQL connection pool
pub type DatabasePool = PgPool;

/// Connections older than this are closed and reopened
const CONNECTION_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
/// Idle connections above `min_connections` are closed after this
const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Pool settings
///
/// ```rust
/// use std::time::Duration;
/// use infra_db::DatabaseConfig;
///
/// let config = DatabaseConfig::new("postgres://localhost/crm")
///     .max_connections(4)
///     .connect_timeout(Duration::from_secs(5));
/// assert_eq!(config.min_connections, 1);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .acquire_timeout(self.connect_timeout)
            .max_lifetime(CONNECTION_MAX_LIFETIME)
            .idle_timeout(CONNECTION_IDLE_TIMEOUT)
    }
}

/// Opens a pool without touching the schema
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    config
        .pool_options()
        .connect(&config.url)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Opens a pool and brings the schema up to date
///
/// # Errors
///
/// `DatabaseError::ConnectionFailed` when the server is unreachable, or a
/// migration error when the schema cannot be applied.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let pool = create_pool(config).await?;
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool open"
    );
    run_migrations(&pool).await?;
    info!("Billing schema up to date");
    Ok(pool)
}
