//! Session configuration
//!
//! Defaults suit a phone; `ALPH_*` environment variables override a loaded
//! file for tooling.

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use alph_core::DeriverConfig;
use alph_storage::KdfParams;
use alph_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding [`SessionConfig::db_path`]
pub const ENV_DB_PATH: &str = "ALPH_WALLET_DB_PATH";
/// Environment variable overriding [`DeriverConfig::max_group_attempts`]
pub const ENV_MAX_GROUP_ATTEMPTS: &str = "ALPH_MAX_GROUP_ATTEMPTS";
/// Environment variable overriding [`RetryPolicy::max_attempts`]
pub const ENV_UNLOCK_MAX_ATTEMPTS: &str = "ALPH_UNLOCK_MAX_ATTEMPTS";

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unlock re-prompt policy
    pub retry: RetryPolicy,
    /// Address derivation limits
    pub deriver: DeriverConfig,
    /// PIN key derivation cost
    pub kdf: KdfParams,
    /// Sync limits
    pub sync: SyncConfig,
    /// Refresh every address right after unlock
    pub sync_on_unlock: bool,
    /// SQLite metadata database; in-memory when unset
    pub db_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            deriver: DeriverConfig::default(),
            kdf: KdfParams::default(),
            sync: SyncConfig::default(),
            sync_on_unlock: true,
            db_path: None,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a JSON file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Apply `ALPH_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            if path.trim().is_empty() {
                warn!(variable = ENV_DB_PATH, "Ignoring empty override");
            } else {
                self.db_path = Some(PathBuf::from(path));
            }
        }
        if let Some(value) = lookup(ENV_MAX_GROUP_ATTEMPTS) {
            self.deriver.max_group_attempts = parse_positive(ENV_MAX_GROUP_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_UNLOCK_MAX_ATTEMPTS) {
            self.retry.max_attempts = parse_positive(ENV_UNLOCK_MAX_ATTEMPTS, &value)?;
        }
        Ok(())
    }
}

fn parse_positive(variable: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{} must be a positive integer, got {:?}",
            variable, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{"sync_on_unlock": false, "deriver": {"max_group_attempts": 10}}"#,
        )
        .unwrap();
        assert!(!config.sync_on_unlock);
        assert_eq!(config.deriver.max_group_attempts, 10);
        assert_eq!(config.deriver.group_count, alph_params::TOTAL_NUMBER_OF_GROUPS);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            SessionConfig::from_json_str("{not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SessionConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_DB_PATH, "/tmp/wallet.db"),
                (ENV_MAX_GROUP_ATTEMPTS, "256"),
                (ENV_UNLOCK_MAX_ATTEMPTS, "5"),
            ]))
            .unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/wallet.db")));
        assert_eq!(config.deriver.max_group_attempts, 256);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = SessionConfig::default();
        let result = config.apply_overrides(env(&[(ENV_UNLOCK_MAX_ATTEMPTS, "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"retry": {"max_attempts": 7}}"#).unwrap();
        let config = SessionConfig::load_from_path(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 7);
        assert!(SessionConfig::load_from_path(dir.path().join("missing.json")).is_err());
    }
}
