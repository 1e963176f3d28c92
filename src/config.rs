//! Configuration for claims-ledger

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ClaimsError;
use crate::retry::RetryPolicy;

/// Default database path
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claims-ledger")
        .join("claims.db")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Hard cap on transaction retry attempts
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,

    /// First retry delay in milliseconds; doubles per attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retry_max_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ClaimsError> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| ClaimsError::Config(format!("Failed to parse {:?}: {}", p, e)))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay_ms: self.retry_base_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = toml::from_str("db_path = \"/tmp/claims.db\"").unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/claims.db"));
        assert_eq!(config.retry_max_attempts, 5);
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_base_delay_ms, 10);
    }
}
