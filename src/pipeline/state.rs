//! In-memory alert state
//!
//! - `AlertStore` - live working set of pending alerts (insertion ordered)
//! - `HistoryStore` - append-only record of resolved alerts
//! - `AlertLedger` - both stores, mutated together so an identity lives in at most one
//!
//! None of these types lock. The lifecycle controller owns a single `AlertLedger`
//! behind one mutex; every method here runs inside that critical section.

use super::error::AlertError;
use super::types::{Alert, AlertId, AlertState, ResolutionOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Live set of pending alerts
#[derive(Debug, Default)]
pub struct AlertStore {
    /// Pending alerts in insertion order
    alerts: Vec<Alert>,

    /// Identity index over `alerts`
    index: HashSet<AlertId>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending alert.
    ///
    /// Returns false (and changes nothing) when the identity is already present.
    pub fn insert(&mut self, mut alert: Alert) -> bool {
        if self.index.contains(&alert.id) {
            return false;
        }

        alert.state = AlertState::Pending;
        alert.resolved_at = None;
        self.index.insert(alert.id.clone());
        self.alerts.push(alert);
        true
    }

    pub fn contains(&self, id: &AlertId) -> bool {
        self.index.contains(id)
    }

    /// Snapshot of pending alerts, insertion ordered
    pub fn list(&self) -> Vec<Alert> {
        self.alerts.clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Remove a pending alert and return its resolved copy
    fn take_resolved(
        &mut self,
        id: &AlertId,
        outcome: ResolutionOutcome,
        resolved_at: i64,
    ) -> Result<Alert, AlertError> {
        if !self.index.remove(id) {
            return Err(AlertError::NotFound(id.clone()));
        }

        let position = self
            .alerts
            .iter()
            .position(|alert| &alert.id == id)
            .ok_or_else(|| AlertError::NotFound(id.clone()))?;

        // `remove` (not `swap_remove`) keeps the remaining alerts in insertion order
        let alert = self.alerts.remove(position);
        Ok(alert.into_resolved(outcome, resolved_at))
    }
}

/// Per-outcome totals over the history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCounts {
    pub synced: usize,
    pub not_online: usize,
}

impl HistoryCounts {
    pub fn total(&self) -> usize {
        self.synced + self.not_online
    }
}

/// Append-only log of resolved alerts
#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Resolved alerts in append order (= `resolved_at` order)
    entries: Vec<Alert>,

    index: HashSet<AlertId>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolved alert.
    ///
    /// Never fails. A pending alert or an identity already recorded is ignored
    /// (and logged): history entries are never replaced.
    pub fn append(&mut self, alert: Alert) {
        if alert.is_pending() {
            log::warn!("⚠️  Refusing to record pending alert {} in history", alert.id);
            return;
        }
        if !self.index.insert(alert.id.clone()) {
            log::warn!("⚠️  Alert {} already in history, keeping first entry", alert.id);
            return;
        }
        self.entries.push(alert);
    }

    pub fn contains(&self, id: &AlertId) -> bool {
        self.index.contains(id)
    }

    /// Resolved alerts in append order, optionally restricted to one outcome
    pub fn list(&self, filter: Option<ResolutionOutcome>) -> Vec<Alert> {
        self.entries
            .iter()
            .filter(|alert| match filter {
                Some(outcome) => alert.state.outcome() == Some(outcome),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> HistoryCounts {
        let mut counts = HistoryCounts::default();
        for alert in &self.entries {
            match alert.state.outcome() {
                Some(ResolutionOutcome::Synced) => counts.synced += 1,
                Some(ResolutionOutcome::NotOnline) => counts.not_online += 1,
                None => {}
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Alert store and history store, kept consistent with each other
#[derive(Debug, Default)]
pub struct AlertLedger {
    pub(crate) alerts: AlertStore,
    pub(crate) history: HistoryStore,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted lists.
    ///
    /// History wins: a pending entry whose identity was already resolved is
    /// dropped, so a stale snapshot cannot resurrect it.
    pub fn restore(pending: Vec<Alert>, history: Vec<Alert>) -> Self {
        let mut ledger = Self::new();
        for alert in history {
            ledger.history.append(alert);
        }

        let mut dropped = 0usize;
        for alert in pending {
            if ledger.history.contains(&alert.id) || !ledger.alerts.insert(alert) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::warn!("⚠️  Dropped {} stale pending alerts while restoring ledger", dropped);
        }

        ledger
    }

    /// True when the identity is pending or already resolved
    pub fn is_known(&self, id: &AlertId) -> bool {
        self.alerts.contains(id) || self.history.contains(id)
    }

    /// Insert a new pending alert unless its identity is known anywhere
    pub fn insert(&mut self, alert: Alert) -> bool {
        if self.history.contains(&alert.id) {
            return false;
        }
        self.alerts.insert(alert)
    }

    /// Move a pending alert to history.
    ///
    /// Removal from the alert store happens before the history append; both
    /// happen under the caller's single lock acquisition.
    pub fn resolve(
        &mut self,
        id: &AlertId,
        outcome: ResolutionOutcome,
        resolved_at: i64,
    ) -> Result<Alert, AlertError> {
        let resolved = self.alerts.take_resolved(id, outcome, resolved_at)?;
        self.history.append(resolved.clone());
        Ok(resolved)
    }

    pub fn pending(&self) -> &AlertStore {
        &self.alerts
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Number of copies of an identity across both stores (0 or 1)
    pub fn copies_of(&self, id: &AlertId) -> usize {
        usize::from(self.alerts.contains(id)) + usize::from(self.history.contains(id))
    }

    /// Pending count per bill, for operator summaries
    pub fn pending_by_bill(&self) -> HashMap<String, usize> {
        let mut by_bill = HashMap::new();
        for alert in &self.alerts.alerts {
            *by_bill.entry(alert.bill_no.clone()).or_insert(0) += 1;
        }
        by_bill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::RawRecord;

    fn make_alert(id: &str, bill: &str, item: &str) -> Alert {
        Alert::pending(
            AlertId::from(id),
            RawRecord {
                bill_no: bill.to_string(),
                item_id: item.to_string(),
                quantity: 1.0,
                sold_at: 1_700_000_000,
                line_seq: None,
            },
        )
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = AlertStore::new();

        assert!(store.insert(make_alert("1-A", "1", "A")));
        assert!(!store.insert(make_alert("1-A", "1", "A")));

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_preserves_insertion_order_after_removal() {
        let mut ledger = AlertLedger::new();
        for (id, item) in [("1-A", "A"), ("1-B", "B"), ("2-C", "C"), ("3-D", "D")] {
            ledger.insert(make_alert(id, "1", item));
        }

        ledger
            .resolve(&AlertId::from("1-B"), ResolutionOutcome::Synced, 10)
            .unwrap();

        let ids: Vec<String> = ledger
            .pending()
            .list()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["1-A", "2-C", "3-D"]);
    }

    #[test]
    fn test_resolve_moves_alert_to_history() {
        let mut ledger = AlertLedger::new();
        ledger.insert(make_alert("1-A", "1", "A"));

        let resolved = ledger
            .resolve(&AlertId::from("1-A"), ResolutionOutcome::NotOnline, 42)
            .unwrap();

        assert_eq!(resolved.state, AlertState::NotOnline);
        assert_eq!(resolved.resolved_at, Some(42));
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.history().list(None), vec![resolved]);
        assert_eq!(ledger.copies_of(&AlertId::from("1-A")), 1);
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let mut ledger = AlertLedger::new();
        let result = ledger.resolve(&AlertId::from("nope"), ResolutionOutcome::Synced, 1);

        assert!(matches!(result, Err(AlertError::NotFound(id)) if id.as_str() == "nope"));
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn test_resolved_identity_cannot_be_reinserted() {
        let mut ledger = AlertLedger::new();
        ledger.insert(make_alert("1-A", "1", "A"));
        ledger
            .resolve(&AlertId::from("1-A"), ResolutionOutcome::Synced, 5)
            .unwrap();

        assert!(!ledger.insert(make_alert("1-A", "1", "A")));
        assert!(ledger.pending().is_empty());
        assert!(ledger.is_known(&AlertId::from("1-A")));
    }

    #[test]
    fn test_history_rejects_pending_and_duplicates() {
        let mut history = HistoryStore::new();

        history.append(make_alert("1-A", "1", "A"));
        assert!(history.is_empty());

        let resolved = make_alert("1-A", "1", "A").into_resolved(ResolutionOutcome::Synced, 1);
        history.append(resolved.clone());
        history.append(
            make_alert("1-A", "1", "A").into_resolved(ResolutionOutcome::NotOnline, 2),
        );

        assert_eq!(history.list(None), vec![resolved]);
    }

    #[test]
    fn test_history_filter_and_counts() {
        let mut ledger = AlertLedger::new();
        for (id, item) in [("1-A", "A"), ("1-B", "B"), ("2-C", "C")] {
            ledger.insert(make_alert(id, "1", item));
        }
        ledger.resolve(&AlertId::from("1-A"), ResolutionOutcome::Synced, 1).unwrap();
        ledger.resolve(&AlertId::from("2-C"), ResolutionOutcome::NotOnline, 2).unwrap();
        ledger.resolve(&AlertId::from("1-B"), ResolutionOutcome::Synced, 3).unwrap();

        let synced: Vec<String> = ledger
            .history()
            .list(Some(ResolutionOutcome::Synced))
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(synced, vec!["1-A", "1-B"]);

        let counts = ledger.history().counts();
        assert_eq!(counts, HistoryCounts { synced: 2, not_online: 1 });
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_restore_drops_resurrected_pending() {
        let resolved = make_alert("1-A", "1", "A").into_resolved(ResolutionOutcome::Synced, 9);
        let ledger = AlertLedger::restore(
            vec![make_alert("1-A", "1", "A"), make_alert("1-B", "1", "B")],
            vec![resolved],
        );

        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.copies_of(&AlertId::from("1-A")), 1);
    }

    #[test]
    fn test_pending_by_bill() {
        let mut ledger = AlertLedger::new();
        ledger.insert(make_alert("1-A", "1", "A"));
        ledger.insert(make_alert("1-B", "1", "B"));
        ledger.insert(make_alert("2-A", "2", "A"));

        let by_bill = ledger.pending_by_bill();
        assert_eq!(by_bill.get("1"), Some(&2));
        assert_eq!(by_bill.get("2"), Some(&1));
    }
}
