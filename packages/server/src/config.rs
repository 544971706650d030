use anyhow::{Context, Result};
use chrono::Duration;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Server-side `statement_timeout` applied to every pooled connection.
    /// A stuck statement inside a sweep surfaces as an error on that booking.
    pub database_statement_timeout_ms: Option<u64>,
    pub sweeps: SweepConfig,
}

/// Cadence and time windows for the booking sweeps
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub expire_requests_cron: String,
    pub start_sessions_cron: String,
    pub end_sessions_cron: String,
    /// How long a booking may sit in `requested` before it expires
    pub request_expiry: Duration,
    /// Sessions whose start is within this buffer of now are started early
    pub start_buffer: Duration,
    /// How long past `end_time` an active session stays open
    pub end_grace: Duration,
    /// Attempts per scheduled run before the failure is logged and dropped
    pub max_attempts: u32,
    pub retry_base_delay: std::time::Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            expire_requests_cron: "0 */5 * * * *".to_string(),
            start_sessions_cron: "0 * * * * *".to_string(),
            end_sessions_cron: "30 */5 * * * *".to_string(),
            request_expiry: Duration::hours(24),
            start_buffer: Duration::seconds(60),
            end_grace: Duration::minutes(5),
            max_attempts: 3,
            retry_base_delay: std::time::Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = SweepConfig::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            database_statement_timeout_ms: env::var("DATABASE_STATEMENT_TIMEOUT_MS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("DATABASE_STATEMENT_TIMEOUT_MS must be a valid number")?,
            sweeps: SweepConfig {
                expire_requests_cron: env::var("EXPIRE_REQUESTS_CRON")
                    .unwrap_or(defaults.expire_requests_cron),
                start_sessions_cron: env::var("START_SESSIONS_CRON")
                    .unwrap_or(defaults.start_sessions_cron),
                end_sessions_cron: env::var("END_SESSIONS_CRON")
                    .unwrap_or(defaults.end_sessions_cron),
                request_expiry: Duration::hours(parse_var("REQUEST_EXPIRY_HOURS", 24)?),
                start_buffer: Duration::seconds(parse_var("SESSION_START_BUFFER_SECS", 60)?),
                end_grace: Duration::seconds(parse_var("SESSION_END_GRACE_SECS", 300)?),
                max_attempts: parse_var("SWEEP_MAX_ATTEMPTS", 3)?,
                retry_base_delay: std::time::Duration::from_millis(parse_var(
                    "SWEEP_RETRY_BASE_MS",
                    500,
                )?),
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
