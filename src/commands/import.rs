//! `import` subcommand: upload prepared groups to the remote platform

use crate::api::ApiClient;
use crate::config::MigrationConfig;
use crate::importer::{importer_for_group, upload_all, IMPORT_ORDER};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use tracing::{info, warn};

pub fn run(config: &MigrationConfig, groups: &[String]) -> Result<()> {
    let store = RecordStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open record store in '{}'", config.data_dir.display()))?;
    let mut api = ApiClient::new(&config.api).context("Failed to build API client")?;

    let selected: Vec<&str> = if groups.is_empty() {
        IMPORT_ORDER.to_vec()
    } else {
        groups.iter().map(String::as_str).collect()
    };

    let mut total_failures = 0;
    for group in selected {
        let Some(mut importer) = importer_for_group(group, &store)
            .with_context(|| format!("Failed to initialize importer for group '{group}'"))?
        else {
            warn!(group, "unknown group, skipping");
            continue;
        };

        let failed = upload_all(importer.as_mut(), &store, &mut api)
            .with_context(|| format!("Import of group '{group}' could not run"))?;

        for (record, error) in &failed {
            warn!(
                group,
                key = record.get_str("id").unwrap_or("?"),
                error = %error,
                "record failed to import"
            );
        }
        total_failures += failed.len();
        info!(group, failures = failed.len(), "group import finished");
    }

    if total_failures > 0 {
        warn!(total_failures, "import finished with failures; re-running is safe");
    } else {
        info!("import finished");
    }
    Ok(())
}
