//! Alert service configuration from environment variables

use super::dedup::IdentityScheme;
use super::error::AlertError;
use super::source::validate_table_name;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Polling cadence in whole minutes, always within 1..=60
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollInterval(u32);

impl PollInterval {
    pub const MIN_MINUTES: u32 = 1;
    pub const MAX_MINUTES: u32 = 60;

    /// Validate a requested interval at the configuration boundary
    pub fn from_minutes(minutes: u32) -> Result<Self, AlertError> {
        if (Self::MIN_MINUTES..=Self::MAX_MINUTES).contains(&minutes) {
            Ok(Self(minutes))
        } else {
            Err(AlertError::ConfigurationInvalid(format!(
                "polling interval must be between {} and {} minutes, got {}",
                Self::MIN_MINUTES,
                Self::MAX_MINUTES,
                minutes
            )))
        }
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(5)
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}min", self.0)
    }
}

/// Configuration for the alert runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Path to the point-of-sale SQLite database
    pub sales_db_path: String,

    /// Table holding one row per sold line
    pub sales_table: String,

    /// Poll cadence
    pub poll_interval: PollInterval,

    /// Generate fake sales instead of reading the database
    pub mock_mode: bool,

    /// How alert identities are derived from sold lines
    pub identity_scheme: IdentityScheme,

    /// Optional JSON snapshot of pending alerts and history
    pub snapshot_path: Option<PathBuf>,
}

impl AlertConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SALES_DB_PATH` (default: data/sales.db)
    /// - `SALES_TABLE` (default: sales)
    /// - `POLL_INTERVAL_MINUTES` (default: 5, range 1..=60)
    /// - `MOCK_MODE` (default: false)
    /// - `ALERT_IDENTITY_SCHEME` (default: bill-item-line)
    /// - `ALERT_SNAPSHOT_PATH` (default: unset, in-memory only)
    pub fn from_env() -> Result<Self, AlertError> {
        let sales_db_path =
            env::var("SALES_DB_PATH").unwrap_or_else(|_| "data/sales.db".to_string());

        let sales_table = env::var("SALES_TABLE").unwrap_or_else(|_| "sales".to_string());
        validate_table_name(&sales_table)?;

        let poll_interval = match env::var("POLL_INTERVAL_MINUTES") {
            Ok(raw) => {
                let minutes = raw.trim().parse::<u32>().map_err(|_| {
                    AlertError::ConfigurationInvalid(format!(
                        "POLL_INTERVAL_MINUTES must be a whole number, got '{}'",
                        raw
                    ))
                })?;
                PollInterval::from_minutes(minutes)?
            }
            Err(_) => PollInterval::default(),
        };

        let mock_mode = match env::var("MOCK_MODE") {
            Ok(raw) => raw.trim().parse::<bool>().map_err(|_| {
                AlertError::ConfigurationInvalid(format!(
                    "MOCK_MODE must be true or false, got '{}'",
                    raw
                ))
            })?,
            Err(_) => false,
        };

        let identity_scheme = match env::var("ALERT_IDENTITY_SCHEME") {
            Ok(raw) => raw.parse()?,
            Err(_) => IdentityScheme::default(),
        };

        let snapshot_path = env::var("ALERT_SNAPSHOT_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            sales_db_path,
            sales_table,
            poll_interval,
            mock_mode,
            identity_scheme,
            snapshot_path,
        })
    }
}
