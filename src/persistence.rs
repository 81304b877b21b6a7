use {
    crate::pipeline::{
        dedup::IdentityScheme, error::AlertError, state::AlertLedger, types::Alert,
    },
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub file_path: PathBuf,
}

impl PersistenceConfig {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }
}

/// Snapshot of the alert ledger for persistence
///
/// Identities are only comparable under the scheme that produced them, so the
/// scheme is stored alongside the alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub identity_scheme: IdentityScheme,
    pub pending: Vec<Alert>,
    pub history: Vec<Alert>,
    pub timestamp: i64,
}

impl LedgerSnapshot {
    pub fn capture(ledger: &AlertLedger, identity_scheme: IdentityScheme) -> Self {
        Self {
            identity_scheme,
            pending: ledger.pending().list(),
            history: ledger.history().list(None),
            timestamp: crate::pipeline::types::current_timestamp(),
        }
    }

    pub fn into_ledger(self) -> AlertLedger {
        AlertLedger::restore(self.pending, self.history)
    }
}

/// Save ledger snapshot to JSON file
///
/// Writes to a sibling temp file first and renames it over the target, so a
/// crash mid-write leaves the previous snapshot intact.
pub fn save_snapshot(snapshot: &LedgerSnapshot, file_path: &Path) -> Result<(), AlertError> {
    let json = serde_json::to_string_pretty(snapshot)?;

    let tmp_path = file_path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, file_path)?;

    log::debug!(
        "Saved {} pending / {} history alerts to {}",
        snapshot.pending.len(),
        snapshot.history.len(),
        file_path.display()
    );
    Ok(())
}

/// Load ledger snapshot from JSON file
///
/// A missing file is an empty ledger, not an error.
pub fn load_snapshot(file_path: &Path) -> Result<Option<LedgerSnapshot>, AlertError> {
    if !file_path.exists() {
        log::info!("No existing snapshot file found: {}", file_path.display());
        return Ok(None);
    }

    let json = fs::read_to_string(file_path)?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&json)?;

    log::info!(
        "Loaded {} pending / {} history alerts from {}",
        snapshot.pending.len(),
        snapshot.history.len(),
        file_path.display()
    );
    Ok(Some(snapshot))
}
