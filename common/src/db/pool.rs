// PostgreSQL connection pool

use crate::config::DatabaseConfig;
use crate::errors::DatabaseError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Create a new database connection pool
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create database pool");
                DatabaseError::ConnectionFailed(e.to_string())
            })?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database connection pool initialized"
        );

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from the given directory
    #[instrument(skip(self))]
    pub async fn run_migrations<P: AsRef<Path> + std::fmt::Debug>(
        &self,
        migrations_dir: P,
    ) -> Result<(), DatabaseError> {
        let migrator = sqlx::migrate::Migrator::new(migrations_dir.as_ref())
            .await
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        migrator
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Perform a health check on the database connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                DatabaseError::HealthCheckFailed(e.to_string())
            })?;

        tracing::debug!("Database health check passed");
        Ok(())
    }
}
