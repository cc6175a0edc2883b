//! Taxonomy loading and work extraction.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::models::{CatalogItem, Landscape, TagBundle};

/// Categories harvested when the config does not say otherwise.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "App Definition and Development",
    "Orchestration & Management",
    "Runtime",
    "Provisioning",
    "Observability and Analysis",
    "Test_Provisioning",
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read taxonomy file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse taxonomy: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// A loaded taxonomy file.
pub struct Catalog {
    landscape: Landscape,
}

impl Catalog {
    /// Load a taxonomy from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, CatalogError> {
        let landscape: Landscape = serde_yaml::from_str(contents)?;
        Ok(Self { landscape })
    }

    pub fn into_landscape(self) -> Landscape {
        self.landscape
    }

    /// Harvestable items from the allowed categories, in document
    /// order. Items carrying neither repo files nor page URLs are
    /// dropped.
    pub fn items(&self, allowed: &[String]) -> Vec<CatalogItem> {
        let mut out = Vec::new();
        for category in &self.landscape.landscape {
            if !allowed.contains(&category.name) {
                continue;
            }
            for subcategory in &category.subcategories {
                for item in &subcategory.items {
                    let catalog_item = CatalogItem {
                        tags: TagBundle::new(
                            category.name.clone(),
                            subcategory.name.clone(),
                            item.name.clone(),
                        ),
                        repo_files: item
                            .repo
                            .as_ref()
                            .map(|r| r.download_urls.clone())
                            .unwrap_or_default(),
                        page_urls: item
                            .website
                            .as_ref()
                            .map(|w| w.docs.clone())
                            .unwrap_or_default(),
                    };
                    if catalog_item.is_empty() {
                        continue;
                    }
                    out.push(catalog_item);
                }
            }
        }
        out
    }

    /// Project names usable as question tags. Parenthetical suffixes
    /// like "(incubating)" are stripped; duplicates keep their first
    /// occurrence.
    pub fn question_tags(&self, allowed: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for category in &self.landscape.landscape {
            if !allowed.contains(&category.name) {
                continue;
            }
            for subcategory in &category.subcategories {
                for item in &subcategory.items {
                    let tag = item.name.split('(').next().unwrap_or("").trim();
                    if tag.is_empty() {
                        continue;
                    }
                    if seen.insert(tag.to_string()) {
                        tags.push(tag.to_string());
                    }
                }
            }
        }
        tags
    }
}
