//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// HTTP fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// GitHub API token; empty falls back to $GITHUB_TOKEN
    #[serde(default)]
    pub github_token: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "landscape-harvester/0.1".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            github_token: String::new(),
        }
    }
}

impl FetchConfig {
    /// Token from the config file, falling back to the GITHUB_TOKEN
    /// environment variable.
    pub fn resolve_github_token(&self) -> Option<String> {
        if !self.github_token.is_empty() {
            return Some(self.github_token.clone());
        }
        std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

/// Document and page harvest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Max concurrent downloads; 0 means twice the available cores
    #[serde(default)]
    pub max_workers: usize,

    /// File extensions never downloaded
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Keep content that does not decode as UTF-8 in the main output tree
    #[serde(default)]
    pub keep_undecodable: bool,

    /// Delete raw files once their category archive is written
    #[serde(default = "default_remove_after_archive")]
    pub remove_after_archive: bool,
}

fn default_excluded_extensions() -> Vec<String> {
    vec!["yml".to_string(), "yaml".to_string()]
}

fn default_remove_after_archive() -> bool {
    true
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            excluded_extensions: default_excluded_extensions(),
            keep_undecodable: false,
            remove_after_archive: default_remove_after_archive(),
        }
    }
}

impl HarvestConfig {
    /// Effective worker count.
    pub fn worker_limit(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(16)
    }
}

/// Q&A harvest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_site")]
    pub site: String,

    /// Questions per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request budget for a single tag in one run
    #[serde(default = "default_max_requests")]
    pub max_requests_per_tag: u32,

    /// API key; empty falls back to $STACK_API_KEY
    #[serde(default)]
    pub api_key: String,

    /// How many days a cached tag list stays fresh
    #[serde(default = "default_tag_cache_days")]
    pub tag_cache_days: u32,

    /// Where the question/answer CSV is written
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

fn default_api_base() -> String {
    "https://api.stackexchange.com/2.3".to_string()
}

fn default_site() -> String {
    "stackoverflow".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_requests() -> u32 {
    9000
}

fn default_tag_cache_days() -> u32 {
    7
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("./sources/stackoverflow_qas.csv")
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            site: default_site(),
            page_size: default_page_size(),
            max_requests_per_tag: default_max_requests(),
            api_key: String::new(),
            tag_cache_days: default_tag_cache_days(),
            csv_path: default_csv_path(),
        }
    }
}

impl QuestionsConfig {
    /// Key from the config file, falling back to the STACK_API_KEY
    /// environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("STACK_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

/// Repository explorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,

    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Extensions worth collecting from repository trees
    #[serde(default = "default_explorer_extensions")]
    pub extensions: Vec<String>,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_explorer_extensions() -> Vec<String> {
    vec![
        "md".to_string(),
        "pdf".to_string(),
        "yml".to_string(),
        "yaml".to_string(),
    ]
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            raw_base: default_raw_base(),
            extensions: default_explorer_extensions(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Taxonomy file driving the harvest
    #[serde(default = "default_taxonomy")]
    pub taxonomy: PathBuf,

    /// Where harvested files and archives land
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Where ledgers and caches live
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Categories worth harvesting
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub harvest: HarvestConfig,

    #[serde(default)]
    pub questions: QuestionsConfig,

    #[serde(default)]
    pub explorer: ExplorerConfig,
}

fn default_taxonomy() -> PathBuf {
    PathBuf::from("./landscape_augmented.yml")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./sources/raw_files")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./sources/state")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_categories() -> Vec<String> {
    crate::catalog::DEFAULT_CATEGORIES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            taxonomy: default_taxonomy(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            log_level: default_log_level(),
            categories: default_categories(),
            fetch: FetchConfig::default(),
            harvest: HarvestConfig::default(),
            questions: QuestionsConfig::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.questions.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "Question page size must be greater than 0".to_string(),
            ));
        }

        if self.categories.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one category must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Ledger of already-harvested document and page URLs.
    pub fn processed_urls_path(&self) -> PathBuf {
        self.state_dir.join("processed_urls.txt")
    }

    /// Ledger of already-harvested question ids.
    pub fn processed_questions_path(&self) -> PathBuf {
        self.state_dir.join("processed_question_ids.txt")
    }

    /// Per-tag pagination positions.
    pub fn questions_progress_path(&self) -> PathBuf {
        self.state_dir.join("questions_progress.json")
    }

    /// Cached project tag list.
    pub fn tag_cache_path(&self) -> PathBuf {
        self.state_dir.join("question_tags.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.output_dir, PathBuf::from("./sources/raw_files"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.questions.page_size, 100);
        assert_eq!(config.categories.len(), 6);
    }

    #[test]
    fn test_harvest_config_default() {
        let harvest = HarvestConfig::default();

        assert_eq!(harvest.max_workers, 0);
        assert_eq!(harvest.excluded_extensions, vec!["yml", "yaml"]);
        assert!(!harvest.keep_undecodable);
        assert!(harvest.remove_after_archive);
    }

    #[test]
    fn test_worker_limit_explicit() {
        let harvest = HarvestConfig {
            max_workers: 4,
            ..Default::default()
        };
        assert_eq!(harvest.worker_limit(), 4);
    }

    #[test]
    fn test_worker_limit_auto_is_positive() {
        let harvest = HarvestConfig::default();
        assert!(harvest.worker_limit() > 0);
    }

    #[test]
    fn test_config_validation_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_timeout() {
        let mut config = AppConfig::default();
        config.fetch.timeout_secs = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_page_size() {
        let mut config = AppConfig::default();
        config.questions.page_size = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_categories() {
        let mut config = AppConfig::default();
        config.categories.clear();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        // Should be parseable
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.output_dir, parsed.output_dir);
        assert_eq!(config.questions.api_base, parsed.questions.api_base);
    }

    #[test]
    fn test_state_paths_live_under_state_dir() {
        let config = AppConfig::default();
        assert!(config.processed_urls_path().starts_with(&config.state_dir));
        assert!(config.questions_progress_path().ends_with("questions_progress.json"));
    }

    #[test]
    fn test_resolve_github_token_prefers_config() {
        let fetch = FetchConfig {
            github_token: "from-config".to_string(),
            ..Default::default()
        };
        assert_eq!(fetch.resolve_github_token(), Some("from-config".to_string()));
    }
}
