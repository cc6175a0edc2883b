//! Per-category zip bundling of harvested files.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::models::sanitize_name;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Bundles a category's files into `<category>.zip` inside the output
/// root. Candidate files are those directly under the root whose name
/// starts with the sanitized category prefix; existing zips never
/// qualify, so re-running cannot nest archives.
pub struct ArchiveWriter {
    root: PathBuf,
    remove_after: bool,
}

impl ArchiveWriter {
    pub fn new(root: PathBuf, remove_after: bool) -> Self {
        Self { root, remove_after }
    }

    /// Archive one category. Returns the number of files bundled;
    /// zero means nothing matched and no zip was written.
    pub fn archive_category(&self, category: &str) -> Result<usize, ArchiveError> {
        let sanitized = sanitize_name(category);
        let prefix = format!("{}_", sanitized);

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ArchiveError::Io(e)),
        };

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match entry.file_name().to_str() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name.starts_with(&prefix) && !name.ends_with(".zip") {
                files.push((name, path));
            }
        }
        files.sort();

        if files.is_empty() {
            return Ok(0);
        }

        let zip_path = self.root.join(format!("{}.zip", sanitized));
        let mut zip = ZipWriter::new(File::create(&zip_path)?);
        let options = SimpleFileOptions::default();

        for (name, path) in &files {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&std::fs::read(path)?)?;
        }
        zip.finish()?;

        info!("Archived {} files into {:?}", files.len(), zip_path);

        if self.remove_after {
            for (_, path) in &files {
                std::fs::remove_file(path)?;
            }
        }

        Ok(files.len())
    }
}
