//! Harvested file placement.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub mod flatten;

pub use flatten::{flatten_html, strip_tags};

/// Subdirectory for content routed away from the main tree.
pub const SECONDARY_DIR: &str = "non_english_files";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes harvested files under a single output root. Non-English
/// content goes to a `non_english_files` subdirectory of the same
/// root so archiving never picks it up.
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_primary(&self, name: &str, body: &[u8]) -> Result<PathBuf, OutputError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    pub fn write_secondary(&self, name: &str, body: &[u8]) -> Result<PathBuf, OutputError> {
        let dir = self.root.join(SECONDARY_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// Base name for a harvested URL. Falls back to a hash of the whole
/// URL when the path has no usable final segment.
pub fn url_stem(url: &Url) -> String {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    if name.is_empty() {
        url_hash(url)
    } else {
        name.to_string()
    }
}

fn url_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
