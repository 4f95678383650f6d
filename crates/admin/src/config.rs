use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use content_store_core::ContentLocales;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} must be a valid {expected}, got `{value}`")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Admin configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Maximum database connections in the pool.
    pub db_max_connections: u32,
    /// Minimum database connections in the pool.
    pub db_min_connections: u32,
    /// Log level (e.g., "info", "debug", "trace").
    pub log_level: String,
    /// Content locales; the default is `DEFAULT_LOCALE` or the first listed.
    pub locales: ContentLocales,
    /// Event bus channel capacity.
    pub event_bus_capacity: usize,
    /// Directory of `<collection>.json` schema files.
    pub schema_dir: Option<PathBuf>,
}

impl AdminConfig {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let locales: Vec<String> = lookup("CONTENT_LOCALES")
            .unwrap_or_else(|| "en".to_string())
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
        let default_locale = match lookup("DEFAULT_LOCALE") {
            Some(code) => code,
            None => locales
                .first()
                .cloned()
                .ok_or(ConfigError::Invalid {
                    key: "CONTENT_LOCALES",
                    value: String::new(),
                    expected: "comma-separated locale list",
                })?,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 20, "u32")?,
            db_min_connections: parse(&lookup, "DB_MIN_CONNECTIONS", 5, "u32")?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            locales: ContentLocales::new(default_locale, locales),
            event_bus_capacity: parse(&lookup, "EVENT_BUS_CAPACITY", 1024, "usize")?,
            schema_dir: lookup("SCHEMA_DIR").map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            expected,
        }),
    }
}
