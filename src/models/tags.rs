//! Provenance tags carried by every harvested document.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Category, subcategory and project names identifying where in the
/// taxonomy a document came from. Joined with `_` they form the leading
/// part of every output filename, which is also what the per-category
/// archiver keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagBundle {
    pub category: String,
    pub subcategory: String,
    pub project: String,
}

impl TagBundle {
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            project: project.into(),
        }
    }

    /// Output filename for a document with the given stem.
    ///
    /// The whole name passes through the sanitizer, so a slash inside a
    /// taxonomy name can never escape the output directory.
    pub fn filename(&self, stem: &str) -> String {
        sanitize_name(&format!(
            "{}_{}_{}_{}",
            self.category, self.subcategory, self.project, stem
        ))
    }
}

/// Replace characters that are invalid in filenames with `_`.
pub fn sanitize_name(name: &str) -> String {
    let forbidden = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    forbidden.replace_all(name, "_").into_owned()
}
