//! Record export
//!
//! Writes the curator-facing tables as pretty JSON documents or JSON Lines.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::application::use_cases::CatalogContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    JsonLines,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonLines => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" | "json-lines" => Ok(Self::JsonLines),
            other => bail!("Unknown export format '{}'", other),
        }
    }
}

/// Serializes `records` in `format`.
pub fn render<T: Serialize>(records: &[T], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let mut out = serde_json::to_string_pretty(records)?;
            out.push('\n');
            Ok(out)
        }
        ExportFormat::JsonLines => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Writes `<dir>/<table>.<ext>` and returns its path.
pub async fn write_table<T: Serialize>(
    dir: &Path,
    table: &str,
    records: &[T],
    format: ExportFormat,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create export directory {:?}", dir))?;
    let path = dir.join(format!("{}.{}", table, format.extension()));
    let content = render(records, format).with_context(|| format!("Failed to serialize {}", table))?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!(table, records = records.len(), path = ?path, "Exported");
    Ok(path)
}

/// Exports the review queue, latest coverage snapshot, mapping history and products.
pub async fn export_all(context: &CatalogContext, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>> {
    let store = context.store();
    let queue = context.ledger().pending_queue();
    let coverage: Vec<_> = store.latest_snapshot().await?.into_iter().collect();
    let history = context.ledger().table().snapshot().history().to_vec();
    let products = store
        .load_products(Some(context.config().pipeline.store_id.as_str()))
        .await?;

    Ok(vec![
        write_table(dir, "unmapped_review_queue", &queue, format).await?,
        write_table(dir, "coverage_report", &coverage, format).await?,
        write_table(dir, "category_mapping", &history, format).await?,
        write_table(dir, "products", &products, format).await?,
    ])
}
