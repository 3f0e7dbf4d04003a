//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use textbook_forge_core::IngestLimits;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub snapshot_dir: PathBuf,
    pub cors_origin: String,
    pub ingest_limits: IngestLimits,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address = parse_or(&var, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>())?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- AI Gateway Settings ---
        let openai_api_key = var("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = var("OPENAI_API_BASE");
        let text_model = var("TEXT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let image_model = var("IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string());

        // --- Storage and Ingestion ---
        let snapshot_dir = var("SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./snapshots"));

        let defaults = IngestLimits::default();
        let ingest_limits = IngestLimits {
            max_file_bytes: parse_or(&var, "MAX_FILE_BYTES", Ok(defaults.max_file_bytes))?,
            max_total_bytes: parse_or(&var, "MAX_TOTAL_BYTES", Ok(defaults.max_total_bytes))?,
        };

        Ok(Self {
            bind_address,
            log_level,
            openai_api_key,
            openai_api_base,
            text_model,
            image_model,
            snapshot_dir,
            cors_origin,
            ingest_limits,
        })
    }
}

/// Parses `key` when it is set, falling back to `default` otherwise.
fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Result<T, T::Err>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.text_model, "gpt-4o-mini");
        assert_eq!(config.image_model, "dall-e-3");
        assert_eq!(config.snapshot_dir, PathBuf::from("./snapshots"));
        assert_eq!(config.ingest_limits, IngestLimits::default());
        assert!(config.openai_api_base.is_none());
    }

    #[test]
    fn missing_api_key_is_reported() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "OPENAI_API_KEY"));
    }

    #[test]
    fn malformed_values_name_their_variable() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MAX_FILE_BYTES", "ten megabytes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "MAX_FILE_BYTES"));

        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RUST_LOG", "loud"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "RUST_LOG"));
    }

    #[test]
    fn overrides_are_honoured() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("TEXT_MODEL", "gpt-4o"),
            ("SNAPSHOT_DIR", "/var/lib/forge"),
            ("MAX_TOTAL_BYTES", "2048"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.text_model, "gpt-4o");
        assert_eq!(config.snapshot_dir, PathBuf::from("/var/lib/forge"));
        assert_eq!(config.ingest_limits.max_total_bytes, 2048);
    }
}
