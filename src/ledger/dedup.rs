//! Append-only ledger of already-harvested keys.

use super::LedgerError;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// One key per line on disk. A key is only written after the work it
/// stands for has completed, so a crash never loses track of anything
/// that still needs doing.
pub struct DedupLedger {
    path: PathBuf,
    inner: Mutex<HashSet<String>>,
}

impl DedupLedger {
    /// Load the ledger, treating a missing file as empty.
    pub fn load(path: PathBuf) -> Result<Self, LedgerError> {
        let keys = match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(LedgerError::Io(e)),
        };

        debug!("Loaded {} ledger entries from {:?}", keys.len(), path);

        Ok(Self {
            path,
            inner: Mutex::new(keys),
        })
    }

    /// Whether the key has already been recorded.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.contains(key)
    }

    /// Record a key, appending it to disk before the in-memory set is
    /// updated. Recording an existing key is a no-op.
    pub async fn record(&self, key: &str) -> Result<(), LedgerError> {
        let mut keys = self.inner.lock().await;
        if keys.contains(key) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", key)?;
        writer.flush()?;

        keys.insert(key.to_string());
        Ok(())
    }

    /// Number of recorded keys.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
