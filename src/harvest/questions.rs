//! Question and answer harvesting from the Stack Exchange API.
//!
//! Each project name becomes a tag. Tags paginate independently and
//! remember their position, so an interrupted run picks up where it
//! stopped instead of re-reading thousands of pages.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use super::{HarvestError, RunStats, RunSummary};
use crate::catalog::Catalog;
use crate::config::{AppConfig, QuestionsConfig};
use crate::fetch::Fetcher;
use crate::ledger::{DedupLedger, PageProgress, ProgressLedger, Terminal};
use crate::output::strip_tags;
use crate::pool::WorkerPool;

/// One row of the output table.
#[derive(Debug, Clone, PartialEq)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    items: Vec<Question>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct Question {
    question_id: u64,
    #[serde(default)]
    answer_count: u32,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct AnswersResponse {
    #[serde(default)]
    items: Vec<Answer>,
}

#[derive(Debug, Deserialize)]
struct Answer {
    #[serde(default)]
    score: i64,
    #[serde(default)]
    body: String,
}

/// Appends rows to the CSV file shared by every tag task.
struct QaSink {
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl QaSink {
    fn open(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let needs_header = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(["question", "answer", "tag"])?;
            writer.flush()?;
        }

        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    async fn append(&self, records: &[QaRecord]) -> Result<(), HarvestError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        for record in records {
            writer.write_record([&record.question, &record.answer, &record.tag])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TagCache {
    tags: Vec<String>,
    last_update: String,
}

struct TagContext {
    fetcher: Arc<Fetcher>,
    progress: Arc<ProgressLedger>,
    seen: Arc<DedupLedger>,
    sink: Arc<QaSink>,
    stats: Arc<RunStats>,
    questions: QuestionsConfig,
    api_key: Option<String>,
}

/// Harvests Q&A threads for every project tag in the catalog.
pub struct QuestionHarvester {
    config: AppConfig,
}

impl QuestionHarvester {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, refresh_tags: bool) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        let tags = resolve_tags(&self.config, refresh_tags)?;

        let stats = Arc::new(RunStats::default());
        let ctx = Arc::new(TagContext {
            fetcher: Arc::new(Fetcher::plain(&self.config.fetch)?),
            progress: Arc::new(ProgressLedger::load(
                self.config.questions_progress_path(),
            )?),
            seen: Arc::new(DedupLedger::load(self.config.processed_questions_path())?),
            sink: Arc::new(QaSink::open(&self.config.questions.csv_path)?),
            stats: stats.clone(),
            questions: self.config.questions.clone(),
            api_key: self.config.questions.resolve_api_key(),
        });

        info!("Harvesting Q&A threads for {} tags", tags.len());

        let mut pool = WorkerPool::new(self.config.harvest.worker_limit());
        for tag in tags {
            if let Some(progress) = ctx.progress.get(&tag).await {
                if progress.is_terminal() {
                    stats.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            let ctx = Arc::clone(&ctx);
            pool.spawn(async move {
                harvest_tag(ctx, tag).await;
            });
        }
        pool.join_all().await;

        if let Some(e) = stats.take_ledger_error().await {
            return Err(HarvestError::Ledger(e));
        }

        let summary = stats.summary(0, started.elapsed()).await;
        info!(
            "Q&A harvest complete: {} rows written, {} tags already done, {} failures",
            summary.fetched, summary.skipped, summary.failed
        );
        Ok(summary)
    }
}

/// Project tags, from the cache when it is fresh enough, otherwise
/// re-derived from the taxonomy and cached.
fn resolve_tags(config: &AppConfig, refresh: bool) -> Result<Vec<String>, HarvestError> {
    let cache_path = config.tag_cache_path();

    if !refresh {
        if let Some(tags) = load_cached_tags(&cache_path, config.questions.tag_cache_days) {
            info!("Using {} cached question tags", tags.len());
            return Ok(tags);
        }
    }

    let catalog = Catalog::from_file(&config.taxonomy)?;
    let tags = catalog.question_tags(&config.categories);

    let cache = TagCache {
        tags: tags.clone(),
        last_update: Utc::now().format("%Y-%m-%d").to_string(),
    };
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&cache_path, serde_json::to_string(&cache)?)?;

    Ok(tags)
}

fn load_cached_tags(path: &Path, max_age_days: u32) -> Option<Vec<String>> {
    let contents = std::fs::read_to_string(path).ok()?;
    let cache: TagCache = serde_json::from_str(&contents).ok()?;
    let last_update = NaiveDate::parse_from_str(&cache.last_update, "%Y-%m-%d").ok()?;

    let age = Utc::now().date_naive().signed_duration_since(last_update);
    if age.num_days() >= max_age_days as i64 {
        return None;
    }
    Some(cache.tags)
}

async fn harvest_tag(ctx: Arc<TagContext>, tag: String) {
    let mut page = match ctx.progress.get(&tag).await {
        Some(PageProgress::Done(_)) => return,
        Some(PageProgress::Page(page)) => page,
        None => 1,
    };

    let search_url = match Url::parse(&format!("{}/search/advanced", ctx.questions.api_base)) {
        Ok(url) => url,
        Err(e) => {
            ctx.stats
                .note_failure(format!(
                    "Invalid API base {}: {}",
                    ctx.questions.api_base, e
                ))
                .await;
            return;
        }
    };

    let mut requests = 0u32;
    loop {
        if requests >= ctx.questions.max_requests_per_tag {
            warn!("Request budget exhausted for tag '{}' at page {}", tag, page);
            return;
        }

        let mut params = vec![
            ("page", page.to_string()),
            ("pagesize", ctx.questions.page_size.to_string()),
            ("order", "desc".to_string()),
            ("sort", "activity".to_string()),
            ("answers", "1".to_string()),
            ("tagged", tag.clone()),
            ("site", ctx.questions.site.clone()),
            ("filter", "withbody".to_string()),
        ];
        if let Some(key) = &ctx.api_key {
            params.push(("key", key.clone()));
        }

        let response: QuestionsResponse = match ctx.fetcher.fetch_json(&search_url, &params).await
        {
            Ok(response) => response,
            Err(e) => {
                ctx.stats
                    .note_failure(format!(
                        "Failed to fetch questions for '{}' page {}: {}",
                        tag, page, e
                    ))
                    .await;
                return;
            }
        };
        requests += 1;

        if response.items.is_empty() {
            // An empty first page means the tag matches nothing at all
            let terminal = if page == 1 {
                Terminal::Null
            } else {
                Terminal::Finished
            };
            set_progress(&ctx, &tag, PageProgress::Done(terminal)).await;
            return;
        }

        info!(
            "Fetched {} questions on page {} for tag '{}'",
            response.items.len(),
            page,
            tag
        );

        for question in &response.items {
            if ctx.seen.contains(&question.question_id.to_string()).await {
                continue;
            }
            if question.answer_count == 0 {
                continue;
            }
            if requests >= ctx.questions.max_requests_per_tag {
                warn!("Request budget exhausted for tag '{}' at page {}", tag, page);
                return;
            }

            let answers = match fetch_answers(&ctx, question.question_id).await {
                Ok(answers) => answers,
                Err(message) => {
                    ctx.stats.note_failure(message).await;
                    return;
                }
            };
            requests += 1;

            let question_text = strip_tags(&question.body);
            let rows: Vec<QaRecord> = answers
                .iter()
                .take(3)
                .filter(|a| a.score >= 0)
                .map(|a| QaRecord {
                    question: question_text.clone(),
                    answer: strip_tags(&a.body),
                    tag: tag.clone(),
                })
                .collect();

            if let Err(e) = ctx.sink.append(&rows).await {
                ctx.stats
                    .note_failure(format!(
                        "Failed to write rows for question {}: {}",
                        question.question_id, e
                    ))
                    .await;
                return;
            }
            // The id joins the ledger only once its rows are on disk
            if let Err(e) = ctx.seen.record(&question.question_id.to_string()).await {
                ctx.stats.flag_ledger_error(e).await;
                return;
            }
            ctx.stats
                .fetched
                .fetch_add(rows.len() as u32, Ordering::Relaxed);
        }

        if !response.has_more {
            set_progress(&ctx, &tag, PageProgress::Done(Terminal::Finished)).await;
            return;
        }

        page += 1;
        set_progress(&ctx, &tag, PageProgress::Page(page)).await;
    }
}

async fn fetch_answers(ctx: &TagContext, question_id: u64) -> Result<Vec<Answer>, String> {
    let url = Url::parse(&format!(
        "{}/questions/{}/answers",
        ctx.questions.api_base, question_id
    ))
    .map_err(|e| format!("Invalid answers URL for question {}: {}", question_id, e))?;

    let mut params = vec![
        ("order", "desc".to_string()),
        ("sort", "votes".to_string()),
        ("site", ctx.questions.site.clone()),
        ("filter", "withbody".to_string()),
    ];
    if let Some(key) = &ctx.api_key {
        params.push(("key", key.clone()));
    }

    let response: AnswersResponse = ctx
        .fetcher
        .fetch_json(&url, &params)
        .await
        .map_err(|e| format!("Failed to fetch answers for question {}: {}", question_id, e))?;
    Ok(response.items)
}

async fn set_progress(ctx: &TagContext, tag: &str, progress: PageProgress) {
    if let Err(e) = ctx.progress.set(tag, progress).await {
        ctx.stats.flag_ledger_error(e).await;
    }
}
