//! Typed taxonomy tree.
//!
//! Mirrors the interactive-landscape YAML layout: categories hold
//! subcategories, subcategories hold items, and each item may point at a
//! repository (with explorer-discovered download URLs) and a documentation
//! website.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::TagBundle;

/// Top-level taxonomy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landscape {
    pub landscape: Vec<Category>,
}

/// One top-level category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subcategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<LandscapeItem>,
}

/// One project entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandscapeItem {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<WebsiteSource>,
}

/// Repository download URLs grouped by file extension, filled in by the
/// explorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoSource {
    #[serde(default)]
    pub download_urls: BTreeMap<String, Vec<String>>,
}

/// Documentation page URLs for a project website.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteSource {
    #[serde(default)]
    pub docs: Vec<String>,
}

/// Flattened harvest view of one taxonomy item.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub tags: TagBundle,

    /// Repository file URLs keyed by extension.
    pub repo_files: BTreeMap<String, Vec<String>>,

    /// Documentation page URLs.
    pub page_urls: Vec<String>,
}

impl CatalogItem {
    /// True when the item carries nothing to harvest.
    pub fn is_empty(&self) -> bool {
        self.repo_files.values().all(|urls| urls.is_empty()) && self.page_urls.is_empty()
    }
}
