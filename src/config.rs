use crate::error::{AppError, Result};

/// Backoff schedule (milliseconds) for replaying a draw commit after a transient
/// storage error. One retry per entry; the draw itself is never re-run.
pub const COMMIT_RETRY_BACKOFF_MS: &[u64] = &[50, 100, 200, 400];

/// Draw latency histogram bounds in microseconds: 1us to 10 minutes.
pub const LATENCY_MIN_US: u64 = 1;
pub const LATENCY_MAX_US: u64 = 600_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// SQLite pool size (DB_MAX_CONNECTIONS)
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "sweepstake.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::Config("DB_MAX_CONNECTIONS must be a positive integer".to_string())
                })?,
        })
    }
}
