//! GitHub repository tree exploration.
//!
//! Walks every catalog project's repository and rewrites the taxonomy
//! with raw download URLs grouped by extension, which the document
//! harvester then consumes.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use super::HarvestError;
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::models::RepoSource;

const GITHUB_PREFIX: &str = "https://github.com/";

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

/// Outcome of an explore run.
#[derive(Debug, Clone, Default)]
pub struct ExploreSummary {
    pub repos_explored: u32,
    pub repos_skipped: u32,
    pub files_found: u32,
    pub failures: Vec<String>,
    pub duration: Duration,
}

/// Rewrites a taxonomy with the download URLs found in each
/// project's repository.
pub struct RepoExplorer {
    config: AppConfig,
    fetcher: Fetcher,
}

impl RepoExplorer {
    pub fn new(config: AppConfig) -> Result<Self, HarvestError> {
        let fetcher = Fetcher::github(&config.fetch, config.fetch.resolve_github_token())?;
        Ok(Self { config, fetcher })
    }

    /// Explore every repository in the taxonomy and write the
    /// augmented copy to `out`. Projects without a repository URL are
    /// passed through untouched; non-GitHub hosts are skipped.
    pub async fn run(&self, out: &Path) -> Result<ExploreSummary, HarvestError> {
        let started = Instant::now();
        let mut landscape = Catalog::from_file(&self.config.taxonomy)?.into_landscape();
        let mut summary = ExploreSummary::default();

        for category in &mut landscape.landscape {
            for subcategory in &mut category.subcategories {
                for item in &mut subcategory.items {
                    let repo_url = match item.repo_url.as_deref() {
                        Some(url) if !url.is_empty() => url,
                        _ => continue,
                    };

                    match self.download_urls(repo_url).await {
                        Ok(download_urls) => {
                            summary.repos_explored += 1;
                            summary.files_found += download_urls
                                .values()
                                .map(|urls| urls.len() as u32)
                                .sum::<u32>();
                            item.repo = Some(RepoSource { download_urls });
                        }
                        Err(FetchError::InvalidUrl(message)) => {
                            summary.repos_skipped += 1;
                            warn!("Skipping {}: {}", item.name, message);
                        }
                        Err(e) => {
                            let message = format!("Failed to explore {}: {}", repo_url, e);
                            warn!("{}", message);
                            summary.failures.push(message);
                        }
                    }
                }
            }
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out, serde_yaml::to_string(&landscape)?)?;

        summary.duration = started.elapsed();
        info!(
            "Explored {} repositories ({} files) into {:?}",
            summary.repos_explored, summary.files_found, out
        );
        Ok(summary)
    }

    /// Raw download URLs for the repository's interesting files,
    /// grouped by extension. Trees too large for one recursive listing
    /// are walked one level at a time.
    pub async fn download_urls(
        &self,
        repo_url: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, FetchError> {
        let repo = repo_url
            .strip_prefix(GITHUB_PREFIX)
            .ok_or_else(|| {
                FetchError::InvalidUrl(format!("not a GitHub repository: {}", repo_url))
            })?
            .trim_end_matches('/');

        let info_url = Url::parse(&format!("{}/repos/{}", self.config.explorer.api_base, repo))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let info: RepoInfo = self.fetcher.fetch_json(&info_url, &[]).await?;

        let mut download_urls: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut worklist = vec![(info.default_branch.clone(), String::new())];

        while let Some((sha, prefix)) = worklist.pop() {
            let tree_url = Url::parse(&format!(
                "{}/repos/{}/git/trees/{}",
                self.config.explorer.api_base, repo, sha
            ))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

            let mut response: TreeResponse = self
                .fetcher
                .fetch_json(&tree_url, &[("recursive", "1".to_string())])
                .await?;

            if response.truncated {
                info!(
                    "Tree {} of {} truncated, walking one level at a time",
                    sha, repo
                );
                response = self.fetcher.fetch_json(&tree_url, &[]).await?;
                for entry in &response.tree {
                    if entry.kind == "tree" {
                        worklist.push((entry.sha.clone(), join_path(&prefix, &entry.path)));
                    }
                }
            }

            for entry in &response.tree {
                if entry.kind != "blob" {
                    continue;
                }
                let path = join_path(&prefix, &entry.path);
                let extension = path.rsplit('.').next().unwrap_or("");
                if !self
                    .config
                    .explorer
                    .extensions
                    .iter()
                    .any(|e| e.as_str() == extension)
                {
                    continue;
                }
                download_urls
                    .entry(extension.to_string())
                    .or_default()
                    .push(format!(
                        "{}/{}/{}/{}",
                        self.config.explorer.raw_base, repo, info.default_branch, path
                    ));
            }
        }

        Ok(download_urls)
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}
