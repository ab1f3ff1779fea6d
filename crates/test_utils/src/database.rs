//! Throwaway PostgreSQL for integration tests
//!
//! Each `TestDatabase` owns its own container with the workspace migrations
//! applied, so tests never observe each other's rows. Tests that use it
//! need Docker and are marked `#[ignore]`.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

pub type TestDbError = Box<dyn std::error::Error + Send + Sync>;

const POSTGRES_PORT: u16 = 5432;

/// Builds the URL the stock postgres image accepts
pub fn container_url(host: &str, port: u16) -> String {
    format!("postgres://postgres:postgres@{}:{}/postgres", host, port)
}

/// A running container holding the billing schema
pub struct TestDatabase {
    pool: PgPool,
    url: String,
    // dropped last; stops the container
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    /// Starts a container and runs every migration against it
    pub async fn new() -> Result<Self, TestDbError> {
        let container = Postgres::default().start().await?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(POSTGRES_PORT).await?;
        let url = container_url(&host, port);

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(20))
            .connect(&url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;

        Ok(Self {
            pool,
            url,
            _container: container,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
