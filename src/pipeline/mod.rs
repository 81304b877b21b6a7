//! # Sold-item alert pipeline
//!
//! Turns today's sales rows into pending fulfillment alerts and tracks each one
//! until an operator resolves it.
//!
//! ## Architecture
//!
//! ```text
//! PollScheduler (tokio interval, one cycle at a time)
//!     ↓
//! LifecycleController::poll_once()
//!     ↓
//! SalesReader (SQLite or mock) → Vec<RawRecord>
//!     ↓
//! Deduplicator (deterministic identity, drops known records)
//!     ↓
//! AlertLedger: AlertStore (pending) ──resolve──▶ HistoryStore (append-only)
//! ```
//!
//! **Key rule:** an identity lives in at most one place: pending, or history.
//! Once resolved it never comes back, however often the same row is re-read.
//!
//! ## Module Organization
//!
//! - `types` - RawRecord, Alert, lifecycle enums
//! - `error` - SourceError, AlertError
//! - `dedup` - identity schemes and batch admission
//! - `state` - alert store, history store, ledger
//! - `source` - SalesReader trait and implementations
//! - `engine` - lifecycle controller
//! - `scheduler` - background poll loop
//! - `config` - environment configuration

pub mod types;
pub mod error;
pub mod dedup;
pub mod state;
pub mod source;
pub mod engine;
pub mod scheduler;
pub mod config;

// Re-export commonly used types
pub use types::{Alert, AlertId, AlertState, RawRecord, ResolutionOutcome, Urgency};
pub use error::{AlertError, SourceError};
pub use dedup::{Deduplicator, IdentityScheme};
pub use state::{AlertLedger, AlertStore, HistoryCounts, HistoryStore};
pub use source::{MockSalesReader, SalesReader, SqliteSalesReader};
pub use engine::{LifecycleController, PollSummary};
pub use scheduler::PollScheduler;
pub use config::{AlertConfig, PollInterval};
