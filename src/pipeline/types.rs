//! Core data structures for the alert lifecycle
//!
//! - `RawRecord` - one sold line as delivered by a `SalesReader`
//! - `Alert` - pending or resolved fulfillment notification derived from a record
//! - `AlertState` / `ResolutionOutcome` - closed lifecycle variants

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic deduplication key for a sold line
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AlertId {
    fn from(value: &str) -> Self {
        AlertId(value.to_string())
    }
}

impl From<String> for AlertId {
    fn from(value: String) -> Self {
        AlertId(value)
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sold line read from the sales source
///
/// Maps the `sales` table columns:
/// - `BILLNO` → `bill_no`
/// - `ITEMID` → `item_id`
/// - `QTY` → `quantity`
/// - `BILLDATE` → `sold_at` (Unix seconds)
/// - `ENTRYORDER` → `line_seq` (intra-bill tiebreaker, may be NULL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub bill_no: String,
    pub item_id: String,
    pub quantity: f64,
    pub sold_at: i64,
    pub line_seq: Option<i64>,
}

/// How an operator closed an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionOutcome {
    /// Item was synced to the online store
    Synced,
    /// Item is not sold online; nothing to sync
    NotOnline,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::Synced => "synced",
            ResolutionOutcome::NotOnline => "not-online",
        }
    }
}

/// Lifecycle state of an alert
///
/// `Pending` only ever lives in the alert store; the resolved variants only in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertState {
    Pending,
    Synced,
    NotOnline,
}

impl AlertState {
    pub fn outcome(&self) -> Option<ResolutionOutcome> {
        match self {
            AlertState::Pending => None,
            AlertState::Synced => Some(ResolutionOutcome::Synced),
            AlertState::NotOnline => Some(ResolutionOutcome::NotOnline),
        }
    }
}

impl From<ResolutionOutcome> for AlertState {
    fn from(outcome: ResolutionOutcome) -> Self {
        match outcome {
            ResolutionOutcome::Synced => AlertState::Synced,
            ResolutionOutcome::NotOnline => AlertState::NotOnline,
        }
    }
}

/// A sold item awaiting (or past) operator action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub bill_no: String,
    pub sku: String,
    pub product_label: String,
    pub quantity: f64,
    pub sold_at: i64,
    pub state: AlertState,
    pub resolved_at: Option<i64>,
}

impl Alert {
    /// Build a pending alert for a record whose identity is already computed
    pub fn pending(id: AlertId, record: RawRecord) -> Self {
        Self {
            id,
            bill_no: record.bill_no,
            // No product catalogue join: the item id doubles as label
            product_label: record.item_id.clone(),
            sku: record.item_id,
            quantity: record.quantity,
            sold_at: record.sold_at,
            state: AlertState::Pending,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == AlertState::Pending
    }

    /// Consume a pending alert and produce its terminal copy.
    ///
    /// Only the alert store calls this, at the moment it removes the alert.
    pub(crate) fn into_resolved(mut self, outcome: ResolutionOutcome, resolved_at: i64) -> Self {
        debug_assert!(self.is_pending(), "resolved alerts are terminal");
        self.state = outcome.into();
        self.resolved_at = Some(resolved_at);
        self
    }
}

/// Age bucket of a pending alert, as shown on the operator dashboard
///
/// Consumer-side helper: the lifecycle never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Sold less than an hour ago
    Critical,
    /// Sold between one and four hours ago
    Standard,
    /// Sold more than four hours ago
    Aging,
}

impl Urgency {
    pub fn classify(sold_at: i64, now: i64) -> Self {
        let age_secs = now.saturating_sub(sold_at);
        if age_secs < 3_600 {
            Urgency::Critical
        } else if age_secs < 4 * 3_600 {
            Urgency::Standard
        } else {
            Urgency::Aging
        }
    }
}

/// Helper to get current Unix timestamp
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
