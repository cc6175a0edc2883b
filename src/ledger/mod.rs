//! Persistent run state: dedup ledgers and pagination progress.

use std::path::PathBuf;
use thiserror::Error;

pub mod dedup;
pub mod progress;

pub use dedup::DedupLedger;
pub use progress::{PageProgress, ProgressLedger, Terminal};

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt ledger at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}
