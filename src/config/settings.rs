//! Deployment settings loaded from config.toml
//!
//! The file carries the pricing defaults, the local time zone of the charging
//! site and the roster of users sharing the slots. The roster is used to seed
//! the `users` table on startup.

use crate::core::shift::SystemClock;
use crate::entities::UserRole;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Price per kWh used when a user has no personal price.
pub const DEFAULT_UNIT_PRICE: f64 = 0.7;
/// Local time zone of the source deployment (UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;
/// Number of records returned by recent-history queries when no limit is given.
pub const DEFAULT_RECENT_RECORDS_LIMIT: u64 = 50;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Site-wide settings
    #[serde(default)]
    pub settings: Settings,
    /// Users to seed
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Site-wide settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Price per kWh for users without a personal price
    pub default_unit_price: f64,
    /// Offset of the site's local time from UTC, in whole hours
    pub utc_offset_hours: i32,
    /// Default page size for recent record listings
    pub recent_records_limit: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_unit_price: DEFAULT_UNIT_PRICE,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            recent_records_limit: DEFAULT_RECENT_RECORDS_LIMIT,
        }
    }
}

impl Settings {
    /// Builds the wall clock for the configured time zone.
    pub fn clock(&self) -> Result<SystemClock> {
        SystemClock::with_offset_hours(self.utc_offset_hours)
    }

    fn validate(&self) -> Result<()> {
        if !self.default_unit_price.is_finite() || self.default_unit_price <= 0.0 {
            return Err(Error::Config {
                message: format!(
                    "default_unit_price must be positive, got {}",
                    self.default_unit_price
                ),
            });
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(Error::Config {
                message: format!(
                    "utc_offset_hours out of range: {}",
                    self.utc_offset_hours
                ),
            });
        }
        if self.recent_records_limit == 0 {
            return Err(Error::Config {
                message: "recent_records_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for a single user
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    /// Display name, unique within the group
    pub name: String,
    /// Personal price per kWh
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// Role within the group
    #[serde(default = "default_role")]
    pub role: UserRole,
    /// Whether the user appears in the monthly settlement report
    #[serde(default = "default_can_reserve")]
    pub can_reserve: bool,
}

const fn default_role() -> UserRole {
    UserRole::User
}

const fn default_can_reserve() -> bool {
    true
}

/// Parses configuration from TOML text and validates the settings.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.settings.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A setting is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_config(&contents)
}

/// Loads configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config> {
    load_config("config.toml")
}
