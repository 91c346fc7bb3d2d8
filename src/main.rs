//! Catalog Canon operator CLI
//!
//! Crawl runs over captured pages, curator approvals, coverage audits and
//! exports. Configuration comes from `catalog_canon.toml` plus `CATALOG_CANON_*`
//! environment overrides.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use catalog_canon::application::{
    ApprovalRequest, CatalogContext, ExportFormat, QueueItem, export_all,
};
use catalog_canon::domain::discovery::SitemapContext;
use catalog_canon::domain::services::breadcrumb_normalizer::normalize_raw;
use catalog_canon::domain::services::{Resolution, UrlClassifier};
use catalog_canon::infrastructure::config::{CanonConfig, ConfigManager};
use catalog_canon::infrastructure::logging::init_logging_with_config;
use catalog_canon::infrastructure::sitemap_parser::extract_sitemaps_from_robots;
use catalog_canon::infrastructure::snapshot_fetcher::SnapshotFetcher;

#[derive(Parser)]
#[command(name = "catalog-canon")]
#[command(author, version, about = "Map store catalog breadcrumbs onto a canonical taxonomy")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file if none exists
    InitConfig,

    /// Print the normalized key of each breadcrumb
    Normalize {
        /// Raw breadcrumbs, e.g. "Grocery > Dairy & Eggs > Milk"
        #[arg(required = true)]
        breadcrumbs: Vec<String>,
    },

    /// Classify URLs as category, product or noncatalog
    Classify {
        /// Sitemap the URLs were listed in
        #[arg(long, default_value = "")]
        sitemap: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Resolve breadcrumbs against the active mapping
    Resolve {
        #[arg(required = true)]
        breadcrumbs: Vec<String>,
    },

    /// Crawl captured pages starting from sitemap URLs
    Run {
        /// Directory holding manifest.json and the captured pages
        #[arg(long)]
        pages: PathBuf,
        /// Sitemap root URLs
        #[arg(long = "sitemap")]
        sitemaps: Vec<String>,
        /// robots.txt whose Sitemap: lines are added to the roots
        #[arg(long)]
        robots: Option<PathBuf>,
    },

    /// Approve a path -> canon_id mapping
    Approve {
        path: String,
        canon_id: u16,
        #[arg(long = "by")]
        approved_by: String,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        confidence: Option<f32>,
        /// Supersede a different active mapping for the same path
        #[arg(long = "override")]
        allow_override: bool,
        /// Approve a category-page candidate of the configured store
        #[arg(long)]
        candidate: bool,
    },

    /// Import curated mappings from a JSON array of {path, canon_id, approved_by, note?, confidence?}
    Import { file: PathBuf },

    /// Re-resolve stored products and record coverage and stability
    Coverage,

    /// List pending unmapped paths, most frequent first
    Queue {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// List unapproved category-page candidates
    Candidates {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Export queue, coverage, mapping history and products
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// json or jsonl
        #[arg(long, default_value = "json")]
        format: ExportFormat,
    },
}

#[derive(Deserialize)]
struct ImportRow {
    path: String,
    canon_id: u16,
    approved_by: String,
    note: Option<String>,
    confidence: Option<f32>,
}

impl From<ImportRow> for ApprovalRequest {
    fn from(row: ImportRow) -> Self {
        let mut request = ApprovalRequest::new(row.path, row.canon_id, row.approved_by);
        request.note = row.note;
        request.confidence = row.confidence;
        request
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };

    if let Commands::InitConfig = cli.command {
        if manager.save_default().await? {
            println!("Wrote {}", manager.config_path().display());
        } else {
            println!("{} already exists", manager.config_path().display());
        }
        return Ok(());
    }

    let config = manager.load_config()?;
    init_logging_with_config(config.logging.clone())?;
    info!("Catalog Canon {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::InitConfig => {}
        Commands::Normalize { breadcrumbs } => {
            for raw in breadcrumbs {
                println!("{}", normalize_raw(&raw));
            }
        }
        Commands::Classify { sitemap, urls } => classify(&config, &sitemap, &urls)?,
        Commands::Resolve { breadcrumbs } => {
            let context = CatalogContext::open(config).await?;
            let snapshot = context.ledger().table().snapshot();
            for raw in breadcrumbs {
                let path = normalize_raw(&raw);
                match context.resolver().resolve(&path, &snapshot) {
                    Resolution::Resolved { canon_id, matched_key } => {
                        let name = context.taxonomy().get(canon_id).map_or("", |c| c.name.as_str());
                        println!("{}\t{}\t{}\t(via {})", path, canon_id, name, matched_key);
                    }
                    Resolution::Unmapped => println!("{}\tunmapped", path),
                }
            }
        }
        Commands::Run { pages, mut sitemaps, robots } => {
            if let Some(robots) = robots {
                let text = tokio::fs::read_to_string(&robots)
                    .await
                    .with_context(|| format!("Failed to read {:?}", robots))?;
                sitemaps.extend(extract_sitemaps_from_robots(&text));
            }
            anyhow::ensure!(!sitemaps.is_empty(), "No sitemap roots given");

            let context = CatalogContext::open(config).await?;
            let fetcher = SnapshotFetcher::open(&pages).await?;
            let report = context.run_and_persist(&fetcher, &sitemaps).await?;
            print_json(&report.summary())?;
        }
        Commands::Approve {
            path,
            canon_id,
            approved_by,
            note,
            confidence,
            allow_override,
            candidate,
        } => {
            let context = CatalogContext::open(config).await?;
            let mut request = ApprovalRequest::new(path, canon_id, approved_by).allow_override(allow_override);
            request.note = note;
            request.confidence = confidence;

            let curation = context.curation();
            let receipt = if candidate {
                curation
                    .approve_candidate(&context.config().pipeline.store_id, &request)
                    .await?
            } else {
                curation.approve_unmapped(&request).await?
            };
            println!(
                "{} -> {} ({}; {} queued paths resolved; mapping version {})",
                receipt.entry.normalized_path,
                receipt.entry.canon_id,
                if receipt.changed { "recorded" } else { "already active" },
                receipt.resolved_records.len(),
                receipt.snapshot.version()
            );
        }
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;
            let rows: Vec<ImportRow> = serde_json::from_str(&raw).context("Invalid import file")?;
            let requests: Vec<ApprovalRequest> = rows.into_iter().map(Into::into).collect();

            let context = CatalogContext::open(config).await?;
            let receipts = context.curation().import(&requests).await?;
            let changed = receipts.iter().filter(|r| r.changed).count();
            println!("Imported {} mappings ({} new)", receipts.len(), changed);
        }
        Commands::Coverage => {
            let context = CatalogContext::open(config).await?;
            let report = context.audit().await?;
            print_json(&report)?;
        }
        Commands::Queue { limit } => {
            let context = CatalogContext::open(config).await?;
            let items: Vec<QueueItem> = context
                .ledger()
                .pending_queue()
                .iter()
                .take(limit)
                .map(QueueItem::from)
                .collect();
            print_json(&items)?;
        }
        Commands::Candidates { limit } => {
            let context = CatalogContext::open(config).await?;
            for path in context.registry().candidates().into_iter().take(limit) {
                println!("{}\t{}\t{}\t{}", path.store_id, path.occurrences, path.normalized, path.example_url);
            }
        }
        Commands::Export { dir, format } => {
            let dir = dir.unwrap_or_else(|| config.pipeline.export_dir.clone());
            let context = CatalogContext::open(config).await?;
            for path in export_all(&context, &dir, format).await? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn classify(config: &CanonConfig, sitemap: &str, urls: &[String]) -> Result<()> {
    let classifier = UrlClassifier::new(&config.classifier.to_rules()).context("Invalid classifier pattern")?;
    let context = SitemapContext::new(sitemap);
    let records = classifier.classify_batch(urls.iter().map(|u| (u.as_str(), &context)));
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
