//! Harvest orchestration.
//!
//! Drives the catalog-to-disk pipeline: extract work from the
//! taxonomy, fetch concurrently with dedup against the URL ledger,
//! route by language, and bundle each category into a zip.

pub mod explorer;
pub mod questions;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::archive::ArchiveWriter;
use crate::catalog::{Catalog, CatalogError};
use crate::classify::{Bucket, Classifier};
use crate::config::AppConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::ledger::{DedupLedger, LedgerError};
use crate::models::{CatalogItem, TagBundle};
use crate::output::{flatten_html, url_stem, OutputWriter};
use crate::pool::WorkerPool;

const GOOGLE_DOC_PREFIX: &str = "https://docs.google.com/document/";

/// Errors that stop a harvest run outright. Per-URL failures are
/// collected in the run summary instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Outcome of a harvest run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fetched: u32,
    pub skipped: u32,
    pub failed: u32,
    pub secondary: u32,
    pub archived: u32,
    pub failures: Vec<String>,
    pub duration: Duration,
}

/// Counters shared by all in-flight tasks of a run.
#[derive(Default)]
struct RunStats {
    fetched: AtomicU32,
    skipped: AtomicU32,
    failed: AtomicU32,
    secondary: AtomicU32,
    failures: Mutex<Vec<String>>,
    ledger_error: Mutex<Option<LedgerError>>,
}

impl RunStats {
    async fn note_failure(&self, message: String) {
        warn!("{}", message);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().await.push(message);
    }

    /// A ledger write failure means resumability is gone, so the run
    /// must end with an error once in-flight tasks drain.
    async fn flag_ledger_error(&self, e: LedgerError) {
        error!("Ledger write failed: {}", e);
        let mut slot = self.ledger_error.lock().await;
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    async fn take_ledger_error(&self) -> Option<LedgerError> {
        self.ledger_error.lock().await.take()
    }

    async fn summary(&self, archived: u32, duration: Duration) -> RunSummary {
        RunSummary {
            fetched: self.fetched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            secondary: self.secondary.load(Ordering::Relaxed),
            archived,
            failures: self.failures.lock().await.clone(),
            duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    RepoFile,
    Page,
    GoogleDoc,
}

struct HarvestTask {
    url: String,
    tags: TagBundle,
    kind: TaskKind,
}

struct TaskContext {
    fetcher: Arc<Fetcher>,
    ledger: Arc<DedupLedger>,
    classifier: Classifier,
    writer: Arc<OutputWriter>,
    stats: Arc<RunStats>,
}

enum TaskSource {
    RepoFiles,
    Pages,
}

/// Harvests the raw files the explorer collected into the taxonomy.
pub struct DocumentHarvester {
    config: AppConfig,
}

impl DocumentHarvester {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        run_harvest(&self.config, TaskSource::RepoFiles).await
    }
}

/// Harvests documentation pages listed under each project's website,
/// flattening HTML to text and exporting Google Docs as PDFs.
pub struct PageHarvester {
    config: AppConfig,
}

impl PageHarvester {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        run_harvest(&self.config, TaskSource::Pages).await
    }
}

async fn run_harvest(config: &AppConfig, source: TaskSource) -> Result<RunSummary, HarvestError> {
    let started = Instant::now();

    let catalog = Catalog::from_file(&config.taxonomy)?;
    let items = catalog.items(&config.categories);

    // Repo files live on GitHub, so that source gets the token when
    // one is configured. Pages are arbitrary websites and never do.
    let fetcher = match source {
        TaskSource::RepoFiles => {
            Fetcher::github(&config.fetch, config.fetch.resolve_github_token())?
        }
        TaskSource::Pages => Fetcher::plain(&config.fetch)?,
    };

    let stats = Arc::new(RunStats::default());
    let ctx = Arc::new(TaskContext {
        fetcher: Arc::new(fetcher),
        ledger: Arc::new(DedupLedger::load(config.processed_urls_path())?),
        classifier: Classifier::new(config.harvest.keep_undecodable),
        writer: Arc::new(OutputWriter::new(config.output_dir.clone())),
        stats: stats.clone(),
    });

    let archiver = ArchiveWriter::new(
        config.output_dir.clone(),
        config.harvest.remove_after_archive,
    );
    let mut pool = WorkerPool::new(config.harvest.worker_limit());
    let mut archived = 0u32;

    info!(
        "Starting harvest of {} projects across {} categories",
        items.len(),
        config.categories.len()
    );

    for category in &config.categories {
        let tasks = match source {
            TaskSource::RepoFiles => {
                repo_file_tasks(&items, category, &config.harvest.excluded_extensions)
            }
            TaskSource::Pages => page_tasks(&items, category),
        };
        info!("Category '{}': {} URLs to consider", category, tasks.len());

        run_category(&ctx, &mut pool, tasks).await;

        // A failed archive leaves raw files in place for the next run
        match archiver.archive_category(category) {
            Ok(count) => archived += count as u32,
            Err(e) => warn!("Failed to archive category '{}': {}", category, e),
        }
    }

    if let Some(e) = stats.take_ledger_error().await {
        return Err(HarvestError::Ledger(e));
    }

    let summary = stats.summary(archived, started.elapsed()).await;
    info!(
        "Harvest complete: {} fetched, {} skipped, {} failed, {} routed non-English",
        summary.fetched, summary.skipped, summary.failed, summary.secondary
    );
    Ok(summary)
}

fn repo_file_tasks(
    items: &[CatalogItem],
    category: &str,
    excluded_extensions: &[String],
) -> Vec<HarvestTask> {
    let mut tasks = Vec::new();
    for item in items.iter().filter(|i| i.tags.category == category) {
        for (extension, urls) in &item.repo_files {
            if excluded_extensions.contains(extension) {
                continue;
            }
            for url in urls {
                tasks.push(HarvestTask {
                    url: url.clone(),
                    tags: item.tags.clone(),
                    kind: TaskKind::RepoFile,
                });
            }
        }
    }
    tasks
}

fn page_tasks(items: &[CatalogItem], category: &str) -> Vec<HarvestTask> {
    let mut tasks = Vec::new();
    for item in items.iter().filter(|i| i.tags.category == category) {
        for url in &item.page_urls {
            let kind = if url.starts_with(GOOGLE_DOC_PREFIX) {
                TaskKind::GoogleDoc
            } else {
                TaskKind::Page
            };
            tasks.push(HarvestTask {
                url: url.clone(),
                tags: item.tags.clone(),
                kind,
            });
        }
    }
    tasks
}

async fn run_category(ctx: &Arc<TaskContext>, pool: &mut WorkerPool, tasks: Vec<HarvestTask>) {
    for task in tasks {
        if ctx.ledger.contains(&task.url).await {
            info!("Skipping {} (already processed)", task.url);
            ctx.stats.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let ctx = Arc::clone(ctx);
        pool.spawn(async move {
            run_task(ctx, task).await;
        });
    }
    pool.join_all().await;
}

async fn run_task(ctx: Arc<TaskContext>, task: HarvestTask) {
    let parsed = match Url::parse(&task.url) {
        Ok(url) => url,
        Err(e) => {
            ctx.stats
                .note_failure(format!("Invalid URL {}: {}", task.url, e))
                .await;
            return;
        }
    };

    let result = match task.kind {
        TaskKind::RepoFile => harvest_repo_file(&ctx, &task, &parsed).await,
        TaskKind::Page => harvest_page(&ctx, &task, &parsed).await,
        TaskKind::GoogleDoc => harvest_google_doc(&ctx, &task, &parsed).await,
    };

    match result {
        Ok(()) => {
            // The URL joins the ledger only once its file is on disk
            if let Err(e) = ctx.ledger.record(&task.url).await {
                ctx.stats.flag_ledger_error(e).await;
                return;
            }
            ctx.stats.fetched.fetch_add(1, Ordering::Relaxed);
        }
        Err(message) => ctx.stats.note_failure(message).await,
    }
}

async fn harvest_repo_file(
    ctx: &TaskContext,
    task: &HarvestTask,
    url: &Url,
) -> Result<(), String> {
    let doc = ctx
        .fetcher
        .fetch(url)
        .await
        .map_err(|e| format!("Failed to fetch {}: {}", url, e))?;

    let name = task.tags.filename(&url_stem(url));
    let written = match ctx.classifier.classify(&doc.body) {
        Bucket::Primary => ctx.writer.write_primary(&name, &doc.body),
        Bucket::Secondary => {
            ctx.stats.secondary.fetch_add(1, Ordering::Relaxed);
            ctx.writer.write_secondary(&name, &doc.body)
        }
    };
    written.map_err(|e| format!("Failed to write {}: {}", name, e))?;
    Ok(())
}

async fn harvest_page(ctx: &TaskContext, task: &HarvestTask, url: &Url) -> Result<(), String> {
    let doc = ctx
        .fetcher
        .fetch(url)
        .await
        .map_err(|e| format!("Failed to fetch {}: {}", url, e))?;

    let text = flatten_html(&String::from_utf8_lossy(&doc.body));
    let name = format!("{}.md", task.tags.filename(&url_stem(url)));
    ctx.writer
        .write_primary(&name, text.as_bytes())
        .map_err(|e| format!("Failed to write {}: {}", name, e))?;
    Ok(())
}

async fn harvest_google_doc(
    ctx: &TaskContext,
    task: &HarvestTask,
    url: &Url,
) -> Result<(), String> {
    let (doc_id, export_url) =
        google_doc_export(url).ok_or_else(|| format!("No document id in {}", url))?;

    let doc = ctx
        .fetcher
        .fetch(&export_url)
        .await
        .map_err(|e| format!("Failed to fetch {}: {}", export_url, e))?;

    let name = format!("{}.pdf", task.tags.filename(&doc_id));
    ctx.writer
        .write_primary(&name, &doc.body)
        .map_err(|e| format!("Failed to write {}: {}", name, e))?;
    Ok(())
}

/// Document id (second-to-last path segment) and PDF export URL for a
/// Google Docs link.
fn google_doc_export(url: &Url) -> Option<(String, Url)> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    if segments.len() < 2 {
        return None;
    }
    let doc_id = segments[segments.len() - 2].to_string();

    let export = Url::parse(&format!(
        "https://docs.google.com/document/export?format=pdf&id={}",
        doc_id
    ))
    .ok()?;
    Some((doc_id, export))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENGLISH: &str = "Kubernetes is an open source container orchestration platform \
                           for automating deployment, scaling, and management.";
    const FRENCH: &str = "Le chat est sur la chaise et il regarde par la fenetre depuis ce \
                          matin, pendant que la pluie tombe doucement sur le jardin.";

    fn test_config(temp_dir: &TempDir, taxonomy: &str) -> AppConfig {
        let taxonomy_path = temp_dir.path().join("taxonomy.yml");
        std::fs::write(&taxonomy_path, taxonomy).unwrap();

        let mut config = AppConfig::default();
        config.taxonomy = taxonomy_path;
        config.output_dir = temp_dir.path().join("out");
        config.state_dir = temp_dir.path().join("state");
        config.categories = vec!["Runtime".to_string()];
        config
    }

    fn repo_taxonomy(base: &str) -> String {
        format!(
            r#"
landscape:
  - name: Runtime
    subcategories:
      - name: Container Runtime
        items:
          - name: containerd
            repo:
              download_urls:
                md:
                  - {base}/containerd/readme.md
                  - {base}/containerd/arch.md
                yml:
                  - {base}/containerd/ci.yml
          - name: runc
            repo:
              download_urls:
                md:
                  - {base}/runc/readme.md
                  - {base}/runc/guide.md
"#
        )
    }

    async fn mount_doc(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }

    fn zip_names(path: &std::path::Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_document_harvest_full_run() {
        let server = MockServer::start().await;
        mount_doc(&server, "/containerd/readme.md", ENGLISH).await;
        mount_doc(&server, "/containerd/arch.md", ENGLISH).await;
        mount_doc(&server, "/runc/readme.md", ENGLISH).await;
        mount_doc(&server, "/runc/guide.md", ENGLISH).await;
        // No mock for ci.yml: requesting it would fail the run

        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &repo_taxonomy(&server.uri()));

        let summary = DocumentHarvester::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.secondary, 0);
        assert_eq!(summary.archived, 4);

        let ledger = std::fs::read_to_string(config.processed_urls_path()).unwrap();
        assert_eq!(ledger.lines().count(), 4);

        assert_eq!(
            zip_names(&config.output_dir.join("Runtime.zip")),
            vec![
                "Runtime_Container Runtime_containerd_arch.md",
                "Runtime_Container Runtime_containerd_readme.md",
                "Runtime_Container Runtime_runc_guide.md",
                "Runtime_Container Runtime_runc_readme.md",
            ]
        );
        // Raw files were folded into the archive
        assert!(!config
            .output_dir
            .join("Runtime_Container Runtime_containerd_readme.md")
            .exists());
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let server = MockServer::start().await;
        mount_doc(&server, "/containerd/readme.md", ENGLISH).await;
        mount_doc(&server, "/containerd/arch.md", ENGLISH).await;
        mount_doc(&server, "/runc/readme.md", ENGLISH).await;
        mount_doc(&server, "/runc/guide.md", ENGLISH).await;

        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &repo_taxonomy(&server.uri()));

        DocumentHarvester::new(config.clone()).run().await.unwrap();
        // expect(1) on every mock keeps the second run honest
        let summary = DocumentHarvester::new(config).run().await.unwrap();

        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.skipped, 4);
    }

    #[tokio::test]
    async fn test_non_english_content_routed_aside() {
        let server = MockServer::start().await;
        mount_doc(&server, "/liesmich.md", FRENCH).await;

        let taxonomy = format!(
            r#"
landscape:
  - name: Runtime
    subcategories:
      - name: Container Runtime
        items:
          - name: containerd
            repo:
              download_urls:
                md:
                  - {}/liesmich.md
"#,
            server.uri()
        );
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &taxonomy);

        let summary = DocumentHarvester::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.secondary, 1);
        assert_eq!(summary.archived, 0);
        assert!(config
            .output_dir
            .join("non_english_files")
            .join("Runtime_Container Runtime_containerd_liesmich.md")
            .exists());
        // Nothing stayed in the primary tree, so no archive either
        assert!(!config.output_dir.join("Runtime.zip").exists());

        // The URL still counts as processed
        let ledger = std::fs::read_to_string(config.processed_urls_path()).unwrap();
        assert_eq!(ledger.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_isolated() {
        let server = MockServer::start().await;
        mount_doc(&server, "/containerd/readme.md", ENGLISH).await;
        Mock::given(method("GET"))
            .and(path("/containerd/arch.md"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let taxonomy = format!(
            r#"
landscape:
  - name: Runtime
    subcategories:
      - name: Container Runtime
        items:
          - name: containerd
            repo:
              download_urls:
                md:
                  - {base}/containerd/readme.md
                  - {base}/containerd/arch.md
"#,
            base = server.uri()
        );
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &taxonomy);

        let summary = DocumentHarvester::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("arch.md"));

        // The failed URL is not in the ledger and will be retried next run
        let ledger = std::fs::read_to_string(config.processed_urls_path()).unwrap();
        assert_eq!(ledger.lines().count(), 1);
        assert!(ledger.contains("readme.md"));
    }

    #[tokio::test]
    async fn test_page_harvest_flattens_html() {
        let server = MockServer::start().await;
        mount_doc(
            &server,
            "/docs/install.html",
            "<html><body><h1>skip</h1><p>Install containerd first.</p>\
             <pre>apt install containerd</pre></body></html>",
        )
        .await;

        let taxonomy = format!(
            r#"
landscape:
  - name: Runtime
    subcategories:
      - name: Container Runtime
        items:
          - name: containerd
            website:
              docs:
                - {}/docs/install.html
"#,
            server.uri()
        );
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, &taxonomy);
        config.harvest.remove_after_archive = false;

        let summary = PageHarvester::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.archived, 1);

        let page = config
            .output_dir
            .join("Runtime_Container Runtime_containerd_install.html.md");
        let contents = std::fs::read_to_string(&page).unwrap();
        assert_eq!(
            contents,
            "Install containerd first.\n```\napt install containerd```\n"
        );
    }

    #[test]
    fn test_google_doc_export_url() {
        let url =
            Url::parse("https://docs.google.com/document/d/1AbCdEf_93/edit?usp=sharing").unwrap();
        let (doc_id, export) = google_doc_export(&url).unwrap();

        assert_eq!(doc_id, "1AbCdEf_93");
        assert_eq!(
            export.as_str(),
            "https://docs.google.com/document/export?format=pdf&id=1AbCdEf_93"
        );
    }

    #[test]
    fn test_page_tasks_split_google_docs_out() {
        let items = vec![CatalogItem {
            tags: TagBundle::new("Runtime", "Sub", "proj"),
            repo_files: Default::default(),
            page_urls: vec![
                "https://example.com/docs".to_string(),
                "https://docs.google.com/document/d/abc/edit".to_string(),
            ],
        }];

        let tasks = page_tasks(&items, "Runtime");

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].kind, TaskKind::Page);
        assert_eq!(tasks[1].kind, TaskKind::GoogleDoc);
    }

    #[test]
    fn test_repo_file_tasks_skip_excluded_extensions() {
        let mut repo_files = std::collections::BTreeMap::new();
        repo_files.insert("md".to_string(), vec!["https://example.com/a.md".to_string()]);
        repo_files.insert("yml".to_string(), vec!["https://example.com/ci.yml".to_string()]);

        let items = vec![CatalogItem {
            tags: TagBundle::new("Runtime", "Sub", "proj"),
            repo_files,
            page_urls: Vec::new(),
        }];

        let tasks = repo_file_tasks(&items, "Runtime", &["yml".to_string(), "yaml".to_string()]);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://example.com/a.md");
    }
}
