use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{AccountId, BrokerConnection};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub broker_api_url: String,
    /// Broker connections to synchronize each cycle.
    pub connections: Vec<BrokerConnection>,
    /// Trailing window for a connection's first sync.
    pub first_sync_lookback_days: i64,
    /// Overlap before the last recorded success on subsequent syncs.
    pub resync_overlap_days: i64,
    /// Absolute divergence between broker and derived P&L worth logging.
    pub pnl_divergence_threshold: Decimal,
    pub sync_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let broker_api_url = env_map
            .get("BROKER_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("BROKER_API_URL".to_string()))?;

        let first_sync_lookback_days = parse_i64(&env_map, "FIRST_SYNC_LOOKBACK_DAYS", 30)?;
        let resync_overlap_days = parse_i64(&env_map, "RESYNC_OVERLAP_DAYS", 7)?;

        let pnl_divergence_threshold = match env_map.get("PNL_DIVERGENCE_THRESHOLD") {
            Some(raw) => Decimal::from_str(raw).map_err(|_| {
                ConfigError::InvalidValue(
                    "PNL_DIVERGENCE_THRESHOLD".to_string(),
                    "must be a valid decimal".to_string(),
                )
            })?,
            None => Decimal::new(1, 2),
        };

        let sync_interval_secs = env_map
            .get("SYNC_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("300")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "SYNC_INTERVAL_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let connections = parse_connections_from_map(&env_map)?;

        Ok(Config {
            database_path,
            broker_api_url,
            connections,
            first_sync_lookback_days,
            resync_overlap_days,
            pnl_divergence_threshold,
            sync_interval_secs,
        })
    }
}

fn parse_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid i64".to_string())
        }),
        None => Ok(default),
    }
}

/// Parse the connection roster: `conn-id=account-id` entries, comma
/// separated in `SYNC_CONNECTIONS` or one per line in a file named by
/// `SYNC_CONNECTIONS_FILE`.
fn parse_connections_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<BrokerConnection>, ConfigError> {
    let entries: Vec<String> = if let Some(raw) = env_map.get("SYNC_CONNECTIONS") {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else if let Some(file_path) = env_map.get("SYNC_CONNECTIONS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "SYNC_CONNECTIONS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        Vec::new()
    };

    entries
        .into_iter()
        .map(|entry| {
            let (connection_id, account_id) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SYNC_CONNECTIONS".to_string(),
                    format!("entry must be connection_id=account_id, got {}", entry),
                )
            })?;
            Ok(BrokerConnection::new(
                connection_id.trim().to_string(),
                AccountId::new(account_id.trim().to_string()),
            ))
        })
        .collect()
}
