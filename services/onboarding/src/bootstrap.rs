//! Startup dependencies: the database connection and the photo bucket.
//!
//! Both must be ready before the listener is bound; any error here is fatal.

use crate::config::{DatabaseConfig, S3Config};
use crate::employee_store::PgEmployeeStore;
use crate::photo_store::{ensure_bucket, PhotoStore, StorageError};
use backoff::backoff::{Backoff, Constant};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that stop the service from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Unable to establish a database connection after {attempts} attempts: {last_error}")]
    DatabaseUnreachable { attempts: u32, last_error: String },

    #[error("Failed to run database migrations: {0}")]
    Migrations(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to provision photo bucket: {0}")]
    BucketProvisioning(#[from] StorageError),
}

/// Run `connect` until it succeeds, waiting a fixed `delay` between failures.
///
/// Gives up with [`StartupError::DatabaseUnreachable`] after `max_attempts`
/// consecutive failures. No sleep follows the final failure.
pub async fn connect_with_retry<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut connect: F,
) -> Result<T, StartupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = Constant::new(delay);
    let mut attempts = 0u32;

    loop {
        match connect().await {
            Ok(connection) => {
                info!(attempts = attempts + 1, "Connection has been established");
                return Ok(connection);
            }
            Err(e) => {
                attempts += 1;
                let remaining = max_attempts - attempts;

                if remaining == 0 {
                    error!(attempts = attempts, error = %e, "Database connection attempts exhausted");
                    return Err(StartupError::DatabaseUnreachable {
                        attempts,
                        last_error: e.to_string(),
                    });
                }

                let wait = backoff.next_backoff().unwrap_or(delay);
                warn!(
                    attempt = attempts,
                    retries_left = remaining,
                    delay_ms = wait.as_millis() as u64,
                    error = %e,
                    "Unable to connect to the database, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Open the PostgreSQL pool, retrying at a fixed interval
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, StartupError> {
    let options = config.connect_options();

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        max_attempts = config.connect_attempts,
        "Connecting to PostgreSQL"
    );

    connect_with_retry(config.connect_attempts, config.connect_retry_delay(), || {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect_with(options.clone())
    })
    .await
}

/// Apply pending schema migrations
pub async fn apply_migrations(store: &PgEmployeeStore) -> Result<(), StartupError> {
    store.run_migrations().await.map_err(|e| {
        error!(error = %e, "Database migrations failed");
        StartupError::Migrations(e)
    })
}

/// Make sure the configured photo bucket exists
pub async fn provision_bucket(
    store: &dyn PhotoStore,
    config: &S3Config,
) -> Result<(), StartupError> {
    ensure_bucket(store, &config.bucket, &config.region)
        .await
        .map_err(|e| {
            error!(bucket = %config.bucket, error = %e, "Error checking or creating bucket");
            StartupError::BucketProvisioning(e)
        })
}
