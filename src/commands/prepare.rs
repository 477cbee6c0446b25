//! `prepare` subcommand: extract an export into the record store

use crate::config::MigrationConfig;
use crate::preparation::{Preparator, XmlParser};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

pub fn run(config: &MigrationConfig, source: &Path) -> Result<()> {
    let content = std::fs::read(source)
        .with_context(|| format!("Failed to read export file '{}'", source.display()))?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory '{}'", config.data_dir.display())
    })?;
    let store = RecordStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open record store in '{}'", config.data_dir.display()))?;

    let preparator =
        Preparator::new().with_parser(XmlParser::with_diagnostic_dir(&config.data_dir));

    let stats = preparator
        .prepare(&content, &store)
        .context("Extraction failed")?;

    for (group, count) in &stats.records_per_group {
        info!(group = group.as_str(), count, "group prepared");
    }
    info!(total = stats.records_total, "preparation finished");
    Ok(())
}
