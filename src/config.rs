//! Pipeline configuration.
//!
//! `PipelineConfig` is an immutable value handed to the orchestrator at
//! construction time. It can be built in code, or layered from defaults and
//! `RAGLINE_*` environment variables (optionally sourced from `.env` files).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    /// A setting is outside its allowed range
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    /// A required pipeline component was not supplied to a builder
    #[error("missing pipeline component: {0}")]
    MissingComponent(&'static str),
}

/// Tuning values for one orchestrator.
///
/// Shared read-only across every query the orchestrator serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Total compose/generate/validate cycles allowed per query
    pub max_attempts: u32,
    /// Number of chunks requested from the retriever
    pub top_k: usize,
    /// Context budget, in characters of chunk content
    pub max_context_chars: usize,
    /// Time budget for one vectorizer call
    pub embed_timeout: Duration,
    /// Time budget for one retriever call
    pub retrieve_timeout: Duration,
    /// Time budget for one generator call
    pub generate_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            top_k: 3,
            max_context_chars: 6000,
            embed_timeout: Duration::from_secs(10),
            retrieve_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_attempts",
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::MustBePositive { field: "top_k" });
        }
        if self.max_context_chars == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_context_chars",
            });
        }
        for (field, timeout) in [
            ("embed_timeout", self.embed_timeout),
            ("retrieve_timeout", self.retrieve_timeout),
            ("generate_timeout", self.generate_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::MustBePositive { field });
            }
        }
        Ok(())
    }

    /// Builds a configuration from defaults overridden by `RAGLINE_*`
    /// environment variables.
    ///
    /// Recognized variables: `RAGLINE_MAX_ATTEMPTS`, `RAGLINE_TOP_K`,
    /// `RAGLINE_MAX_CONTEXT_CHARS`, `RAGLINE_EMBED_TIMEOUT_SECS`,
    /// `RAGLINE_RETRIEVE_TIMEOUT_SECS` and `RAGLINE_GENERATE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            max_attempts: parse_or(&lookup, "RAGLINE_MAX_ATTEMPTS", defaults.max_attempts)?,
            top_k: parse_or(&lookup, "RAGLINE_TOP_K", defaults.top_k)?,
            max_context_chars: parse_or(
                &lookup,
                "RAGLINE_MAX_CONTEXT_CHARS",
                defaults.max_context_chars,
            )?,
            embed_timeout: secs_or(&lookup, "RAGLINE_EMBED_TIMEOUT_SECS", defaults.embed_timeout)?,
            retrieve_timeout: secs_or(
                &lookup,
                "RAGLINE_RETRIEVE_TIMEOUT_SECS",
                defaults.retrieve_timeout,
            )?,
            generate_timeout: secs_or(
                &lookup,
                "RAGLINE_GENERATE_TIMEOUT_SECS",
                defaults.generate_timeout,
            )?,
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
            expected: "a non-negative integer",
        }),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                expected: "a number of seconds",
            }),
    }
}

/// Loads `.env` files into the process environment.
///
/// Reads `.env` from the working directory (or its parents), then
/// `{config_dir}/ragline/ragline.env`. Variables that are already set are
/// never overwritten. Returns the files that were loaded.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }

    if let Some(path) = user_env_file()
        && path.is_file()
        && dotenvy::from_path(&path).is_ok()
    {
        loaded.push(path);
    }

    loaded
}

/// Returns the per-user env file location.
///
/// - Linux: `~/.config/ragline/ragline.env`
/// - macOS: `~/Library/Application Support/ragline/ragline.env`
/// - Windows: `C:\Users\<user>\AppData\Roaming\ragline\ragline.env`
pub fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ragline").join("ragline.env"))
}
