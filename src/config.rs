// src/config.rs
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

/// Placeholder shipped in example env files; treated as "not configured".
const DATABASE_URL_PLACEHOLDER: &str = "YOUR_DATABASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub feed_source: String,
    /// `None` selects the local backend.
    pub database: Option<DatabaseConfig>,
    pub visitor_storage: StorageLocation,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&lookup, "PORT", 3030)?;
        let feed_source = lookup("FEED_SOURCE").unwrap_or_else(|| {
            info!("FEED_SOURCE not set, using default: data/indicators.json");
            "data/indicators.json".to_string()
        });

        let database = match lookup("DATABASE_URL").map(|url| url.trim().to_string()) {
            Some(url) if !url.is_empty() && url != DATABASE_URL_PLACEHOLDER => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            }),
            _ => {
                warn!("DATABASE_URL not configured, votes will be counted in local mode");
                None
            }
        };

        let visitor_storage = match lookup("VISITOR_STORAGE_PATH") {
            Some(path) if path.eq_ignore_ascii_case("memory") => StorageLocation::Memory,
            Some(path) => StorageLocation::File(PathBuf::from(path)),
            None => StorageLocation::File(PathBuf::from("data/visitors.json")),
        };

        Ok(Self {
            port,
            feed_source,
            database,
            visitor_storage,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
