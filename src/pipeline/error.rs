//! Error types for the alert pipeline
//!
//! Two layers:
//! - `SourceError` - raised by a `SalesReader` when today's records cannot be fetched
//! - `AlertError` - everything the lifecycle controller reports to its callers

use super::types::AlertId;

/// Failure raised by a sales reader
#[derive(Debug)]
pub enum SourceError {
    Database(rusqlite::Error),
    InvalidRow(String),
    Unavailable(String),
}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        SourceError::Database(err)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Database(e) => write!(f, "Database error: {}", e),
            SourceError::InvalidRow(msg) => write!(f, "Invalid sales row: {}", msg),
            SourceError::Unavailable(msg) => write!(f, "Source unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors surfaced by the alert lifecycle
///
/// Duplicate delivery of an already known identity is NOT an error: inserts
/// absorb it silently.
#[derive(Debug)]
pub enum AlertError {
    /// Fetch step failed; the cycle aborted without touching the ledger
    SourceUnavailable(SourceError),

    /// No pending alert carries this identity (already resolved or never existed)
    NotFound(AlertId),

    /// Rejected at the configuration boundary
    ConfigurationInvalid(String),

    /// A record lacks the line sequence the identity scheme depends on
    MissingLineSequence { bill_no: String, item_id: String },

    /// Snapshot could not be read or written
    Persistence(String),
}

impl AlertError {
    /// Whether the caller should simply try again later.
    ///
    /// Connectivity failures are retryable. A `NotFound` means the caller's view
    /// is stale and should be refreshed instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            AlertError::SourceUnavailable(_) | AlertError::Persistence(_) => true,
            AlertError::NotFound(_)
            | AlertError::ConfigurationInvalid(_)
            | AlertError::MissingLineSequence { .. } => false,
        }
    }
}

impl From<SourceError> for AlertError {
    fn from(err: SourceError) -> Self {
        AlertError::SourceUnavailable(err)
    }
}

impl From<std::io::Error> for AlertError {
    fn from(err: std::io::Error) -> Self {
        AlertError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        AlertError::Persistence(err.to_string())
    }
}

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertError::SourceUnavailable(e) => write!(f, "Source unavailable: {}", e),
            AlertError::NotFound(id) => write!(f, "Alert not found: {}", id),
            AlertError::ConfigurationInvalid(msg) => {
                write!(f, "Invalid configuration value: {}", msg)
            }
            AlertError::MissingLineSequence { bill_no, item_id } => write!(
                f,
                "Missing line sequence for bill {} item {} (required by identity scheme)",
                bill_no, item_id
            ),
            AlertError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
        }
    }
}

impl std::error::Error for AlertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlertError::SourceUnavailable(e) => Some(e),
            _ => None,
        }
    }
}
