use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

/// Main configuration for the onboarding service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// SMTP configuration
    pub smtp: SmtpConfig,
    /// Welcome message content
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Upload limits
    #[serde(default)]
    pub upload: UploadConfig,
    /// API configuration
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name
    pub name: String,
    /// Database user
    pub username: String,
    /// Database password
    pub password: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Connection attempts before startup gives up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Fixed delay between connection attempts in seconds
    #[serde(default = "default_connect_retry_delay_secs")]
    pub connect_retry_delay_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding employee photos
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Region used for client signing and bucket creation
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Static access key; falls back to the default AWS credential chain when unset
    pub access_key_id: Option<String>,
    /// Static secret key
    pub secret_access_key: Option<String>,
}

/// SMTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,
    /// SMTP port
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Mail account user
    pub username: String,
    /// Mail account password
    pub password: String,
    /// Sender address; defaults to the account user
    pub from: Option<String>,
    /// Use STARTTLS
    #[serde(default = "default_true")]
    pub starttls: bool,
}

/// Welcome message content
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Email subject line
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Organization named in the greeting
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Sign-off lines, rendered one per line
    #[serde(default = "default_signature")]
    pub signature: Vec<String>,
}

/// Upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum photo size in bytes
    #[serde(default = "default_max_photo_bytes")]
    pub max_photo_bytes: usize,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Directory holding the submission form
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "onboarding-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_retry_delay_secs() -> u64 {
    5
}

fn default_bucket() -> String {
    "image".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Welcome to the Organization".to_string()
}

fn default_organization() -> String {
    "the Organization".to_string()
}

fn default_signature() -> Vec<String> {
    vec!["The Onboarding Team".to_string()]
}

fn default_max_photo_bytes() -> usize {
    1024 * 1024 // 1MiB
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024 // room for the photo plus text fields and multipart framing
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "onboarding-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .set_default("api.port", 3000)?
            .add_source(config::File::with_name("config/onboarding").required(false))
            .add_source(config::File::with_name("/etc/onboarding/onboarding").required(false))
            // ONBOARDING__DATABASE__HOST -> database.host
            .add_source(
                config::Environment::with_prefix("ONBOARDING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Connection options for the configured database
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Fixed interval between startup connection attempts
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }
}

impl SmtpConfig {
    /// Sender mailbox for outgoing mail
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            organization: default_organization(),
            signature: default_signature(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: default_max_photo_bytes(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
