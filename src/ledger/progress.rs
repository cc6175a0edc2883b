//! Per-tag pagination positions for the Q&A harvest.

use super::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::warn;

/// Where a tag's pagination stands. Serialized as a bare page number
/// or one of the terminal strings, e.g. `{"kubernetes": 4, "istio":
/// "finished", "xline": "null"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageProgress {
    /// Next page to request
    Page(u32),
    Done(Terminal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    /// All pages consumed
    Finished,
    /// The tag matched no questions at all
    Null,
}

impl PageProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PageProgress::Done(_))
    }
}

/// Tag-to-position map persisted as a single JSON object.
pub struct ProgressLedger {
    path: PathBuf,
    inner: Mutex<HashMap<String, PageProgress>>,
}

impl ProgressLedger {
    /// Load the ledger. A missing file is an empty ledger; a file that
    /// fails to parse is fatal, since continuing would re-harvest every
    /// tag from page one.
    pub fn load(path: PathBuf) -> Result<Self, LedgerError> {
        let map = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| LedgerError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(LedgerError::Io(e)),
        };

        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub async fn get(&self, tag: &str) -> Option<PageProgress> {
        self.inner.lock().await.get(tag).copied()
    }

    /// Record a tag's position and persist the whole map. Terminal
    /// states are sticky: once a tag is finished or null, further
    /// updates are ignored.
    pub async fn set(&self, tag: &str, progress: PageProgress) -> Result<(), LedgerError> {
        let mut map = self.inner.lock().await;

        if let Some(existing) = map.get(tag) {
            if existing.is_terminal() {
                warn!(
                    "Ignoring progress update for terminal tag '{}': {:?}",
                    tag, progress
                );
                return Ok(());
            }
        }

        map.insert(tag.to_string(), progress);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*map)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Copy of the current map, for status reporting.
    pub async fn snapshot(&self) -> HashMap<String, PageProgress> {
        self.inner.lock().await.clone()
    }
}
