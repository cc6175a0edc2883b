use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use landscape_harvester::config::AppConfig;
use landscape_harvester::harvest::explorer::RepoExplorer;
use landscape_harvester::harvest::questions::QuestionHarvester;
use landscape_harvester::harvest::{DocumentHarvester, PageHarvester, RunSummary};
use landscape_harvester::ledger::{DedupLedger, PageProgress, ProgressLedger, Terminal};

#[derive(Parser)]
#[command(name = "landscape-harvester")]
#[command(about = "Catalog-driven harvester for landscape project docs, pages, and Q&A")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./harvester.toml")]
    config: String,

    /// Override the output directory
    #[arg(long)]
    output_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download repository files for every catalog project
    Harvest {
        /// Only harvest this category
        #[arg(long)]
        category: Option<String>,

        /// Max concurrent downloads
        #[arg(long)]
        workers: Option<usize>,

        /// Keep raw files next to the archives
        #[arg(long)]
        keep_raw: bool,
    },

    /// Download and flatten documentation pages
    Pages {
        /// Only harvest this category
        #[arg(long)]
        category: Option<String>,

        /// Max concurrent downloads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Harvest question and answer threads for every project tag
    Questions {
        /// Rebuild the tag list even if the cache is fresh
        #[arg(long)]
        refresh_tags: bool,

        /// Max concurrent tags
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Walk GitHub trees and rewrite the taxonomy with download URLs
    Explore {
        /// Where to write the augmented taxonomy (defaults to the input path)
        #[arg(long)]
        out: Option<String>,
    },

    /// Show ledger sizes and per-tag pagination state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        AppConfig::from_file(&PathBuf::from(&cli.config))?
    } else {
        AppConfig::default()
    };

    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = PathBuf::from(output_dir);
    }

    // Initialize tracing
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting landscape-harvester v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Harvest {
            category,
            workers,
            keep_raw,
        } => {
            apply_overrides(&mut config, category, workers);
            if keep_raw {
                config.harvest.remove_after_archive = false;
            }

            let summary = DocumentHarvester::new(config).run().await?;
            print_summary("Harvest", &summary);
        }
        Commands::Pages { category, workers } => {
            apply_overrides(&mut config, category, workers);

            let summary = PageHarvester::new(config).run().await?;
            print_summary("Page Harvest", &summary);
        }
        Commands::Questions {
            refresh_tags,
            workers,
        } => {
            apply_overrides(&mut config, None, workers);

            let summary = QuestionHarvester::new(config).run(refresh_tags).await?;
            print_summary("Q&A Harvest", &summary);
        }
        Commands::Explore { out } => {
            let out_path = out
                .map(PathBuf::from)
                .unwrap_or_else(|| config.taxonomy.clone());

            let explorer = RepoExplorer::new(config)?;
            let summary = explorer.run(&out_path).await?;

            println!("\n=== Explore Results ===");
            println!("Repositories explored: {}", summary.repos_explored);
            println!("Repositories skipped:  {}", summary.repos_skipped);
            println!("Files found:           {}", summary.files_found);
            println!("Duration:              {:.2}s", summary.duration.as_secs_f64());
            print_failures(&summary.failures);
        }
        Commands::Status => {
            print_status(&config).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, category: Option<String>, workers: Option<usize>) {
    if let Some(category) = category {
        config.categories = vec![category];
    }
    if let Some(workers) = workers {
        config.harvest.max_workers = workers;
    }
}

fn print_summary(label: &str, summary: &RunSummary) {
    println!("\n=== {} Results ===", label);
    println!("Fetched:     {}", summary.fetched);
    println!("Skipped:     {}", summary.skipped);
    println!("Failed:      {}", summary.failed);
    println!("Non-English: {}", summary.secondary);
    println!("Archived:    {}", summary.archived);
    println!("Duration:    {:.2}s", summary.duration.as_secs_f64());
    print_failures(&summary.failures);
}

fn print_failures(failures: &[String]) {
    if failures.is_empty() {
        return;
    }
    println!("\nFailures:");
    for failure in failures {
        println!("  - {}", failure);
    }
}

async fn print_status(config: &AppConfig) -> Result<()> {
    let urls = DedupLedger::load(config.processed_urls_path())?;
    let questions = DedupLedger::load(config.processed_questions_path())?;
    let progress = ProgressLedger::load(config.questions_progress_path())?;

    println!("\n=== Harvester Status ===");
    println!("Processed URLs:      {}", urls.len().await);
    println!("Processed questions: {}", questions.len().await);

    let snapshot = progress.snapshot().await;
    if snapshot.is_empty() {
        println!("Tag progress:        (none)");
        return Ok(());
    }

    println!("Tag progress:");
    let mut tags: Vec<_> = snapshot.into_iter().collect();
    tags.sort_by(|a, b| a.0.cmp(&b.0));
    for (tag, progress) in tags {
        match progress {
            PageProgress::Page(page) => println!("  {:30} next page {}", tag, page),
            PageProgress::Done(Terminal::Finished) => println!("  {:30} finished", tag),
            PageProgress::Done(Terminal::Null) => println!("  {:30} no questions", tag),
        }
    }
    Ok(())
}
