//! Application Configuration Module
//!
//! Loads the terminal client's settings from the environment (and a `.env`
//! file, if present) into a single struct.

use std::env;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// Frames per microphone callback.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames per speaker callback.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// How much assistant audio the speaker can hold ahead of playback.
pub const OUTPUT_BUFFER_MS: usize = 30_000;

const DEFAULT_URL: &str = "ws://localhost:8765";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub user_id: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub greeting: Option<String>,
    pub connect_timeout: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for COMPANION_CONNECT_TIMEOUT_SECS: {0}")]
    InvalidConnectTimeout(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `COMPANION_URL`: (Optional) WebSocket endpoint of the agent.
    //     Defaults to "ws://localhost:8765".
    // *   `COMPANION_USER_ID`: (Optional) The user to start the session as; the command line wins.
    // *   `COMPANION_INPUT_DEVICE` / `COMPANION_OUTPUT_DEVICE`: (Optional) Device names;
    //     the host defaults otherwise.
    // *   `COMPANION_GREETING`: (Optional) Replaces the greeting shown when the agent is ready.
    // *   `COMPANION_CONNECT_TIMEOUT_SECS`: (Optional) Defaults to 10.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset.
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        let url = var("COMPANION_URL").unwrap_or_else(|| DEFAULT_URL.to_string());

        let connect_timeout = match var("COMPANION_CONNECT_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidConnectTimeout(secs))?,
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            url,
            user_id: var("COMPANION_USER_ID"),
            input_device: var("COMPANION_INPUT_DEVICE"),
            output_device: var("COMPANION_OUTPUT_DEVICE"),
            greeting: var("COMPANION_GREETING"),
            connect_timeout,
            log_level,
        })
    }
}
