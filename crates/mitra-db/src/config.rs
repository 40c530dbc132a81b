//! # Settlement Configuration
//!
//! Where the database lives, which organization this deployment serves,
//! and how reports turn calendar dates into instants.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MITRA_DB_PATH=/var/lib/mitra/mitra.db                              │
//! │     MITRA_ORGANIZATION_ID=...                                          │
//! │     MITRA_UTC_OFFSET_MINUTES=480                                       │
//! │     MITRA_LOOKBACK_DAYS=7                                              │
//! │     MITRA_OVERDUE_ALERT_LIMIT=8                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mitra-settlement/settlement.toml (Linux)                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     +08:00 reporting offset, 7-day window, 8 overdue alerts            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/mitra/mitra.db"
//! max_connections = 5
//!
//! [organization]
//! id = "1b0c7c4e-5d7e-4b59-9b0e-3f3c2f7d9a10"
//!
//! [reporting]
//! utc_offset_minutes = 480
//! default_lookback_days = 7
//! overdue_alert_limit = 8
//! ```

use mitra_core::report::ReportOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

const CONFIG_FILE_NAME: &str = "settlement.toml";
const DATABASE_FILE_NAME: &str = "mitra.db";

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "mitra", "settlement")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// `[organization]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    /// Owner entity id; `None` until the organization is created.
    #[serde(default)]
    pub id: Option<String>,
}

// =============================================================================
// App Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub organization: OrganizationSettings,

    #[serde(default)]
    pub reporting: ReportOptions,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (settlement.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading settlement config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns the default if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load settlement config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a config file without applying environment overrides.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Settlement config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if matches!(&self.organization.id, Some(id) if id.trim().is_empty()) {
            return Err(ConfigError::Invalid("organization.id must not be blank".into()));
        }
        self.reporting.validate()?;
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MITRA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(id) = std::env::var("MITRA_ORGANIZATION_ID") {
            self.organization.id = Some(id);
        }

        if let Ok(offset) = std::env::var("MITRA_UTC_OFFSET_MINUTES") {
            match offset.parse::<i32>() {
                Ok(minutes) => self.reporting.utc_offset_minutes = minutes,
                Err(_) => warn!(value = %offset, "Ignoring unparsable MITRA_UTC_OFFSET_MINUTES"),
            }
        }

        if let Ok(days) = std::env::var("MITRA_LOOKBACK_DAYS") {
            match days.parse::<u32>() {
                Ok(days) => self.reporting.default_lookback_days = days,
                Err(_) => warn!(value = %days, "Ignoring unparsable MITRA_LOOKBACK_DAYS"),
            }
        }

        if let Ok(limit) = std::env::var("MITRA_OVERDUE_ALERT_LIMIT") {
            match limit.parse::<usize>() {
                Ok(limit) => self.reporting.overdue_alert_limit = limit,
                Err(_) => warn!(value = %limit, "Ignoring unparsable MITRA_OVERDUE_ALERT_LIMIT"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mitra", "settlement")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reporting.utc_offset_minutes, 480);
        assert_eq!(config.reporting.default_lookback_days, 7);
        assert_eq!(config.reporting.overdue_alert_limit, 8);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [reporting]
            utc_offset_minutes = 420
            "#,
        )
        .unwrap();
        assert_eq!(config.reporting.utc_offset_minutes, 420);
        assert_eq!(config.reporting.default_lookback_days, 7);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.organization.id, None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.reporting.utc_offset_minutes = 24 * 60;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.reporting.default_lookback_days = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.organization.id = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_read_back() {
        let dir = std::env::temp_dir().join(format!("mitra-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.database.path = dir.join("test.db");
        config.organization.id = Some("org-1".to_string());
        config.save(Some(path.clone())).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_db_config_follows_settings() {
        let mut config = AppConfig::default();
        config.database.path = PathBuf::from("/tmp/mitra-test.db");
        config.database.max_connections = 3;
        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/mitra-test.db"));
        assert_eq!(db.max_connections, 3);
    }
}
