//! `restock.toml` configuration.
//!
//! Every section and key is optional; a missing file means all defaults.
//!
//! ```toml
//! [thresholds]
//! low_stock = 20
//! high_gap = 100
//!
//! [quantity]
//! max_on_hand = 10000
//!
//! [ledger]
//! path = "stock_history.csv"
//! append_timeout_ms = 5000
//!
//! [session]
//! open_set = "open_set.json"
//! page_size = 20
//!
//! [access]
//! users_file = "users.csv"
//! write_roles = ["user", "manager"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use restock_core::gap::DEFAULT_MAX_ON_HAND;
use restock_core::{QuantityBounds, Thresholds};
use restock_engine::{AccessPolicy, EngineConfig, Role};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestockConfig {
    pub thresholds: Thresholds,
    pub quantity: QuantitySection,
    pub ledger: LedgerSection,
    pub session: SessionSection,
    pub access: AccessSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuantitySection {
    pub max_on_hand: u32,
}

impl Default for QuantitySection {
    fn default() -> Self {
        QuantitySection {
            max_on_hand: DEFAULT_MAX_ON_HAND,
        }
    }
}

/// `[ledger]` section: the history file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    pub path: PathBuf,
    pub append_timeout_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        LedgerSection {
            path: PathBuf::from("stock_history.csv"),
            append_timeout_ms: 5000,
        }
    }
}

/// `[session]` section: the working set between passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub open_set: PathBuf,
    /// Default `--limit` for `pending`.
    pub page_size: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        SessionSection {
            open_set: PathBuf::from("open_set.json"),
            page_size: 20,
        }
    }
}

/// `[access]` section. Without `users_file`, no login is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessSection {
    pub users_file: Option<PathBuf>,
    pub write_roles: Vec<Role>,
}

impl Default for AccessSection {
    fn default() -> Self {
        AccessSection {
            users_file: None,
            write_roles: AccessPolicy::default().write_roles,
        }
    }
}

impl RestockConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            bounds: QuantityBounds::new(self.quantity.max_on_hand),
            thresholds: self.thresholds,
            append_timeout: Duration::from_millis(self.ledger.append_timeout_ms),
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            write_roles: self.access.write_roles.clone(),
        }
    }
}

/// Read and parse the config file at `path`; a missing file yields defaults.
///
/// Returns a human-readable error string on failure.
pub fn read_config(path: &Path) -> Result<RestockConfig, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(RestockConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: RestockConfig = toml::from_str("").unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.quantity.max_on_hand, 10_000);
        assert_eq!(config.ledger.path, PathBuf::from("stock_history.csv"));
        assert_eq!(config.session.page_size, 20);
        assert!(config.access.users_file.is_none());
        assert_eq!(config.access.write_roles, vec![Role::User, Role::Manager]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: RestockConfig = toml::from_str(
            r#"
            [thresholds]
            low_stock = 5

            [ledger]
            append_timeout_ms = 250

            [access]
            users_file = "ops/users.csv"
            write_roles = ["manager"]
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.low_stock, 5);
        assert_eq!(config.thresholds.high_gap, 100);
        let engine = config.engine_config();
        assert_eq!(engine.append_timeout, Duration::from_millis(250));
        assert!(!config.access_policy().can_write(Role::User));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<RestockConfig>("[ledger]\nfile = \"x.csv\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(&dir.path().join("restock.toml")).unwrap();
        assert_eq!(config.session.open_set, PathBuf::from("open_set.json"));
    }
}
