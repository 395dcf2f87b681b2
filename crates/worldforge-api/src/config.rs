//! Server configuration loaded from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use worldforge_worlds::application::scheduler::{
    DEFAULT_MAX_ERROR_LENGTH, DEFAULT_STALE_AFTER_SECS, SchedulerConfig,
};

use crate::error::AppError;

/// Provider settings handed to the credentials provider.
#[derive(Clone)]
pub struct LlmSettings {
    /// `LLM_API_URL`.
    pub api_url: Option<String>,
    /// `LLM_API_KEY`.
    pub api_key: Option<String>,
    /// `LLM_MODEL`.
    pub model: Option<String>,
    /// `LLM_TIMEOUT_SECS`.
    pub timeout: Duration,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Connection pool size.
    pub database_max_connections: u32,
    /// Whether this instance runs the generation loop.
    pub scheduler_enabled: bool,
    /// Delay between scheduler ticks.
    pub scheduler_interval: Duration,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
    /// Provider settings.
    pub llm: LlmSettings,
    /// Optional prompt catalog overriding the embedded one.
    pub prompts_path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset, a value does
    /// not parse, or `JOB_STALE_AFTER_SECS` does not exceed
    /// `LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of
    /// a variable if set.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;

        let max_error_length: usize =
            parse_or(&lookup, "JOB_MAX_ERROR_LENGTH", DEFAULT_MAX_ERROR_LENGTH)?;
        if max_error_length == 0 {
            return Err(AppError::Config(
                "JOB_MAX_ERROR_LENGTH must be positive".to_owned(),
            ));
        }
        let llm_timeout_secs: u64 = parse_or(&lookup, "LLM_TIMEOUT_SECS", 120)?;
        let stale_after_secs: i64 =
            parse_or(&lookup, "JOB_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS)?;
        // A job may legitimately run for the whole provider timeout.
        if !u64::try_from(stale_after_secs).is_ok_and(|secs| secs > llm_timeout_secs) {
            return Err(AppError::Config(format!(
                "JOB_STALE_AFTER_SECS must exceed LLM_TIMEOUT_SECS ({llm_timeout_secs})"
            )));
        }
        let stale_after = chrono::Duration::try_seconds(stale_after_secs).ok_or_else(|| {
            AppError::Config("JOB_STALE_AFTER_SECS is out of range".to_owned())
        })?;
        let interval_ms: u64 = parse_or(&lookup, "SCHEDULER_INTERVAL_MS", 2000)?;
        if interval_ms == 0 {
            return Err(AppError::Config(
                "SCHEDULER_INTERVAL_MS must be positive".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            scheduler_enabled: parse_or(&lookup, "SCHEDULER_ENABLED", true)?,
            scheduler_interval: Duration::from_millis(interval_ms),
            scheduler: SchedulerConfig {
                max_error_length,
                stale_after,
            },
            llm: LlmSettings {
                api_url: lookup("LLM_API_URL"),
                api_key: lookup("LLM_API_KEY"),
                model: lookup("LLM_MODEL"),
                timeout: Duration::from_secs(llm_timeout_secs),
            },
            prompts_path: lookup("PROMPTS_PATH").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}
