use anyhow::{Context, Result};
use onboarding_service::api::{start_api_server, AppState};
use onboarding_service::bootstrap::{apply_migrations, connect_database, provision_bucket};
use onboarding_service::config::Config;
use onboarding_service::{NotificationComposer, PgEmployeeStore, S3PhotoStore, SmtpMailer, SubmissionService};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting onboarding service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Storage must be reachable before the form is served
    let pool = connect_database(&config.database)
        .await
        .context("Failed to connect to database")?;
    let employees = Arc::new(PgEmployeeStore::new(pool));

    if config.database.run_migrations {
        apply_migrations(&employees)
            .await
            .context("Failed to run database migrations")?;
    }

    let photos = Arc::new(S3PhotoStore::new(&config.s3).await);
    provision_bucket(photos.as_ref(), &config.s3)
        .await
        .context("Failed to provision photo bucket")?;

    let mailer = Arc::new(SmtpMailer::new(&config.smtp).context("Failed to initialize SMTP mailer")?);
    let composer = NotificationComposer::new(config.smtp.sender(), config.notification.clone())
        .context("Failed to load welcome email template")?;

    let submissions = SubmissionService::new(
        photos,
        employees,
        mailer,
        composer,
        config.s3.bucket.clone(),
    );

    // Create API state
    let state = AppState {
        submissions: Arc::new(submissions),
        max_photo_bytes: config.upload.max_photo_bytes,
    };

    start_api_server(state, &config.api, &config.upload, shutdown_signal()).await?;

    info!("Onboarding service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Shutting down onboarding service");
}
