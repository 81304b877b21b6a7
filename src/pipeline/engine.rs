//! Lifecycle controller - orchestration layer for the alert lifecycle
//!
//! ## Architecture
//!
//! ```text
//! PollScheduler tick
//!     ↓
//! LifecycleController::poll_once()
//!     ↓
//! SalesReader::fetch_todays_records()      (no lock held)
//!     ↓
//! Deduplicator::admit() + AlertStore::insert()   (one ledger lock)
//!
//! operator action
//!     ↓
//! LifecycleController::mark_synced() / mark_not_online()
//!     ↓
//! AlertStore removal → HistoryStore append       (one ledger lock)
//! ```
//!
//! The controller is an owned service object: share it with `Arc`, there is no
//! global alert list.

use super::dedup::{Deduplicator, IdentityScheme};
use super::error::AlertError;
use super::source::SalesReader;
use super::state::{AlertLedger, HistoryCounts};
use super::types::{current_timestamp, Alert, AlertId, RawRecord, ResolutionOutcome};
use crate::persistence::{load_snapshot, save_snapshot, LedgerSnapshot, PersistenceConfig};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Records returned by the reader
    pub fetched: usize,
    /// New pending alerts created
    pub admitted: usize,
    /// Records already represented by a pending or resolved alert
    pub duplicates: usize,
}

/// Owns the alert ledger and every operation that touches it
pub struct LifecycleController {
    /// Alert store + history store behind one lock
    ledger: Mutex<AlertLedger>,

    dedup: Deduplicator,

    /// Snapshot hook (None: in-memory only)
    persistence: Option<PersistenceConfig>,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl LifecycleController {
    /// Create a controller with an empty ledger, stamping resolutions with system time
    pub fn new(scheme: IdentityScheme) -> Self {
        Self::new_with_timestamp_fn(scheme, Box::new(current_timestamp))
    }

    /// Create a controller with a custom timestamp function
    ///
    /// Used for testing with deterministic timestamps.
    pub fn new_with_timestamp_fn(
        scheme: IdentityScheme,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            ledger: Mutex::new(AlertLedger::new()),
            dedup: Deduplicator::new(scheme),
            persistence: None,
            now_fn,
        }
    }

    /// Attach a JSON snapshot: load it now, save it after every mutation.
    ///
    /// A snapshot written under a different identity scheme is refused: its
    /// identities would never match freshly computed ones.
    pub fn with_persistence(mut self, config: PersistenceConfig) -> Result<Self, AlertError> {
        if let Some(snapshot) = load_snapshot(&config.file_path)? {
            if snapshot.identity_scheme != self.dedup.scheme() {
                return Err(AlertError::ConfigurationInvalid(format!(
                    "snapshot {} was written with identity scheme {}, configured scheme is {}",
                    config.file_path.display(),
                    snapshot.identity_scheme.as_str(),
                    self.dedup.scheme().as_str()
                )));
            }
            self.ledger = Mutex::new(snapshot.into_ledger());
        }
        self.persistence = Some(config);
        Ok(self)
    }

    pub fn identity_scheme(&self) -> IdentityScheme {
        self.dedup.scheme()
    }

    /// Run one fetch → dedup → insert cycle.
    ///
    /// A reader failure ends the cycle before the ledger is touched; the error is
    /// logged here and returned so the caller can report it.
    pub async fn poll_once(&self, reader: &dyn SalesReader) -> Result<PollSummary, AlertError> {
        log::debug!("📥 Polling {} reader for today's sales...", reader.source_name());

        let batch = match reader.fetch_todays_records().await {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("❌ Failed to fetch sales from {}: {}", reader.source_name(), e);
                return Err(AlertError::SourceUnavailable(e));
            }
        };

        let summary = self.ingest(batch)?;
        if summary.admitted > 0 {
            log::info!(
                "🛒 {} new sold items ({} fetched, {} already known)",
                summary.admitted,
                summary.fetched,
                summary.duplicates
            );
        } else {
            log::debug!("No new sales ({} fetched)", summary.fetched);
        }
        Ok(summary)
    }

    /// Deduplicate a fetched batch and insert the admitted alerts.
    ///
    /// Dedup and insert share one lock acquisition, so no resolution can slip in
    /// between the "already known?" check and the insert.
    ///
    /// `Err(Persistence)` means the alerts were admitted in memory but the
    /// snapshot was not written.
    pub fn ingest(&self, batch: Vec<RawRecord>) -> Result<PollSummary, AlertError> {
        let fetched = batch.len();

        let mut ledger = self.ledger();
        let admitted = match self.dedup.admit(batch, &ledger) {
            Ok(admitted) => admitted,
            Err(e) => {
                log::error!("❌ Rejected sales batch of {} records: {}", fetched, e);
                return Err(e);
            }
        };

        let mut inserted = 0;
        for alert in admitted {
            let sku = alert.sku.clone();
            if ledger.insert(alert) {
                inserted += 1;
                log::info!("🔔 New item sold: {}", sku);
            }
        }

        if inserted > 0 {
            self.persist(&ledger)?;
        }

        Ok(PollSummary {
            fetched,
            admitted: inserted,
            duplicates: fetched - inserted,
        })
    }

    /// Snapshot of pending alerts in insertion order
    pub fn list_pending(&self) -> Vec<Alert> {
        self.ledger().pending().list()
    }

    /// Resolved alerts in resolution order, optionally for one outcome
    pub fn list_history(&self, filter: Option<ResolutionOutcome>) -> Vec<Alert> {
        self.ledger().history().list(filter)
    }

    pub fn history_counts(&self) -> HistoryCounts {
        self.ledger().history().counts()
    }

    pub fn pending_by_bill(&self) -> HashMap<String, usize> {
        self.ledger().pending_by_bill()
    }

    /// Operator synced the item to the online store
    pub fn mark_synced(&self, id: &AlertId) -> Result<Alert, AlertError> {
        self.resolve(id, ResolutionOutcome::Synced)
    }

    /// Operator confirmed the item is not sold online
    pub fn mark_not_online(&self, id: &AlertId) -> Result<Alert, AlertError> {
        self.resolve(id, ResolutionOutcome::NotOnline)
    }

    /// Move a pending alert to history with the given outcome.
    ///
    /// `NotFound` is the expected answer for a double click or a stale client.
    /// `Persistence` means the alert was moved to history in memory but the
    /// snapshot was not written; resolving again answers `NotFound`.
    pub fn resolve(&self, id: &AlertId, outcome: ResolutionOutcome) -> Result<Alert, AlertError> {
        let mut ledger = self.ledger();
        // Stamped under the lock: history append order follows resolved_at
        let resolved_at = (self.now_fn)();

        match ledger.resolve(id, outcome, resolved_at) {
            Ok(alert) => {
                log::info!("✅ Alert {} resolved as {}", id, outcome.as_str());
                self.persist(&ledger)?;
                Ok(alert)
            }
            Err(e) => {
                log::debug!("Alert {} not resolved: {}", id, e);
                Err(e)
            }
        }
    }

    fn ledger(&self) -> MutexGuard<'_, AlertLedger> {
        // Every mutation completes before its guard drops, so a poisoned ledger is still consistent
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, ledger: &AlertLedger) -> Result<(), AlertError> {
        let config = match &self.persistence {
            Some(config) => config,
            None => return Ok(()),
        };

        let snapshot = LedgerSnapshot::capture(ledger, self.dedup.scheme());
        save_snapshot(&snapshot, &config.file_path).map_err(|e| {
            log::error!("❌ Change applied but snapshot not saved: {}", e);
            e
        })
    }
}
