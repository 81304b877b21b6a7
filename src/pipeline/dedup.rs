//! Identity computation and batch deduplication
//!
//! An alert's identity is derived only from fields of the sold line, never from
//! poll timing or randomness, so the same row yields the same identity on every
//! poll and repeated delivery is always recognized as a duplicate.
//!
//! Parts are joined with `-`. A `-` or `%` inside a part is percent-encoded
//! first, so `1` + `A-B` and `1-A` + `B` stay distinct.

use super::error::AlertError;
use super::state::AlertLedger;
use super::types::{Alert, AlertId, RawRecord};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::str::FromStr;

/// How identities are built from a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityScheme {
    /// `{bill}-{item}-{line}`; every record must carry a line sequence
    #[default]
    BillItemLine,

    /// `{bill}-{item}`; repeated lines of one item in a bill collapse into the first
    BillItem,
}

impl IdentityScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityScheme::BillItemLine => "bill-item-line",
            IdentityScheme::BillItem => "bill-item",
        }
    }
}

impl FromStr for IdentityScheme {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bill-item-line" => Ok(IdentityScheme::BillItemLine),
            "bill-item" => Ok(IdentityScheme::BillItem),
            other => Err(AlertError::ConfigurationInvalid(format!(
                "unknown identity scheme '{}' (expected bill-item-line or bill-item)",
                other
            ))),
        }
    }
}

/// Admits new records from a fetched batch
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    scheme: IdentityScheme,
}

impl Deduplicator {
    pub fn new(scheme: IdentityScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> IdentityScheme {
        self.scheme
    }

    /// Compute the identity of a record
    pub fn identify(&self, record: &RawRecord) -> Result<AlertId, AlertError> {
        let bill = escape_part(record.bill_no.trim());
        let item = escape_part(record.item_id.trim());

        match self.scheme {
            IdentityScheme::BillItem => Ok(AlertId::from(format!("{}-{}", bill, item))),
            IdentityScheme::BillItemLine => match record.line_seq {
                Some(line) => Ok(AlertId::from(format!("{}-{}-{}", bill, item, line))),
                None => Err(AlertError::MissingLineSequence {
                    bill_no: record.bill_no.clone(),
                    item_id: record.item_id.clone(),
                }),
            },
        }
    }

    /// Filter a batch down to records not yet known to the ledger.
    ///
    /// Identities are computed for the whole batch first: one record without a
    /// usable identity rejects the batch, so nothing is admitted partially.
    /// Records repeated inside the batch are admitted once. Output keeps the
    /// order the source produced.
    pub fn admit(
        &self,
        batch: Vec<RawRecord>,
        ledger: &AlertLedger,
    ) -> Result<Vec<Alert>, AlertError> {
        let identified = batch
            .into_iter()
            .map(|record| self.identify(&record).map(|id| (id, record)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let admitted = identified
            .into_iter()
            .filter(|(id, _)| !ledger.is_known(id) && seen.insert(id.clone()))
            .map(|(id, record)| Alert::pending(id, record))
            .collect();

        Ok(admitted)
    }
}

fn escape_part(part: &str) -> Cow<'_, str> {
    if part.contains(|c| c == '-' || c == '%') {
        Cow::Owned(part.replace('%', "%25").replace('-', "%2D"))
    } else {
        Cow::Borrowed(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ResolutionOutcome;

    fn make_record(bill: &str, item: &str, line: Option<i64>) -> RawRecord {
        RawRecord {
            bill_no: bill.to_string(),
            item_id: item.to_string(),
            quantity: 1.0,
            sold_at: 1_700_000_000,
            line_seq: line,
        }
    }

    #[test]
    fn test_identity_is_reproducible() {
        let dedup = Deduplicator::new(IdentityScheme::BillItemLine);
        let record = make_record("17", "SKU-9", Some(3));

        let first = dedup.identify(&record).unwrap();
        let second = dedup.identify(&record.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str(), "17-SKU%2D9-3");
    }

    #[test]
    fn test_separator_inside_a_part_cannot_collide() {
        let dedup = Deduplicator::new(IdentityScheme::BillItem);
        let ledger = AlertLedger::new();
        let batch = vec![make_record("1", "A-B", None), make_record("1-A", "B", None)];

        let admitted = dedup.admit(batch, &ledger).unwrap();

        let ids: Vec<&str> = admitted.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1-A%2DB", "1%2DA-B"]);
        assert_eq!(
            dedup.identify(&make_record("5%", "2D", None)).unwrap().as_str(),
            "5%25-2D"
        );
    }

    #[test]
    fn test_bill_item_scheme_ignores_line() {
        let dedup = Deduplicator::new(IdentityScheme::BillItem);

        assert_eq!(dedup.identify(&make_record("1", "A", Some(4))).unwrap().as_str(), "1-A");
        assert_eq!(dedup.identify(&make_record(" 1 ", "A ", None)).unwrap().as_str(), "1-A");
    }

    #[test]
    fn test_missing_line_sequence_rejects_batch() {
        let dedup = Deduplicator::new(IdentityScheme::BillItemLine);
        let ledger = AlertLedger::new();
        let batch = vec![make_record("1", "A", Some(1)), make_record("1", "B", None)];

        let result = dedup.admit(batch, &ledger);

        match result {
            Err(AlertError::MissingLineSequence { bill_no, item_id }) => {
                assert_eq!(bill_no, "1");
                assert_eq!(item_id, "B");
            }
            other => panic!("expected MissingLineSequence, got {:?}", other),
        }
    }

    #[test]
    fn test_admit_keeps_source_order_and_drops_known() {
        let dedup = Deduplicator::new(IdentityScheme::BillItemLine);
        let mut ledger = AlertLedger::new();
        ledger.insert(Alert::pending(
            AlertId::from("1-B-2"),
            make_record("1", "B", Some(2)),
        ));

        let batch = vec![
            make_record("2", "Z", Some(1)),
            make_record("1", "B", Some(2)),
            make_record("1", "A", Some(1)),
            make_record("2", "Z", Some(1)),
        ];
        let admitted = dedup.admit(batch, &ledger).unwrap();

        let ids: Vec<&str> = admitted.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2-Z-1", "1-A-1"]);
    }

    #[test]
    fn test_admit_skips_resolved_identities() {
        let dedup = Deduplicator::new(IdentityScheme::BillItem);
        let mut ledger = AlertLedger::new();
        ledger.insert(Alert::pending(AlertId::from("1-A"), make_record("1", "A", None)));
        ledger
            .resolve(&AlertId::from("1-A"), ResolutionOutcome::Synced, 10)
            .unwrap();

        let admitted = dedup
            .admit(vec![make_record("1", "A", None)], &ledger)
            .unwrap();

        assert!(admitted.is_empty());
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("bill-item".parse::<IdentityScheme>().unwrap(), IdentityScheme::BillItem);
        assert_eq!(
            " Bill-Item-Line ".parse::<IdentityScheme>().unwrap(),
            IdentityScheme::BillItemLine
        );
        assert!(matches!(
            "random".parse::<IdentityScheme>(),
            Err(AlertError::ConfigurationInvalid(_))
        ));
    }
}
