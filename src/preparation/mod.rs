//! Extraction stage: parse, validate, extract, merge, persist
//!
//! The [`Preparator`] runs the full aggregation sequence over one export:
//! parse (with one sanitize-retry), verify the export dialect, run every
//! extractor over the same validated document, merge triples per group with
//! last-write-wins key semantics, flatten each group to a materialized record
//! list, and persist the result through the record store. Any validation or
//! extraction error aborts the run before anything is persisted.

pub mod checker;
pub mod extractors;
pub mod parser;

pub use checker::verify_wordpress_source;
pub use extractors::{default_extractors, ExtractError, Extractor};
pub use parser::{Document, ParseError, XmlParser, DIAGNOSTIC_ARTIFACT};

use crate::store::{RecordStore, StoreError};
use crate::types::Record;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the aggregation stage. All of them are fatal to the run;
/// nothing is persisted once one occurs.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-group record counts for one aggregation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepareStats {
    /// Records persisted per group
    pub records_per_group: BTreeMap<String, usize>,
    /// Total records persisted
    pub records_total: usize,
}

/// Orchestrates parse -> validate -> extract -> flatten -> persist
pub struct Preparator {
    parser: XmlParser,
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for Preparator {
    fn default() -> Self {
        Self {
            parser: XmlParser::new(),
            extractors: default_extractors(),
        }
    }
}

impl Preparator {
    /// Preparator with the default parser and extractor set
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the parser (diagnostic artifact location)
    pub fn with_parser(mut self, parser: XmlParser) -> Self {
        self.parser = parser;
        self
    }

    /// Override the extractor list
    pub fn with_extractors(mut self, extractors: Vec<Box<dyn Extractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Run the full aggregation sequence over one export and persist every
    /// group through the store.
    pub fn prepare(
        &self,
        content: &[u8],
        store: &RecordStore,
    ) -> Result<PrepareStats, PrepareError> {
        let document = self.parser.parse(content)?;
        verify_wordpress_source(&document)?;

        let grouped = self.extract_groups(&document)?;

        let mut stats = PrepareStats::default();
        for (group, records) in &grouped {
            for record in records {
                store.insert(group, record)?;
            }
            info!(group = group.as_str(), count = records.len(), "persisted group");
            stats.records_per_group.insert(group.clone(), records.len());
            stats.records_total += records.len();
        }
        store.flush()?;

        Ok(stats)
    }

    /// Run every extractor over the validated document and merge the triples
    /// into flattened per-group record lists.
    ///
    /// Within a group, a later extraction of an already-seen key overwrites
    /// the earlier record; export dialects repeat records with refinements
    /// across the document and the last occurrence is authoritative. The
    /// record order inside each returned group is unspecified.
    pub fn extract_groups(
        &self,
        document: &Document,
    ) -> Result<BTreeMap<String, Vec<Record>>, ExtractError> {
        let mut merged: BTreeMap<String, HashMap<String, Record>> = BTreeMap::new();

        for extractor in &self.extractors {
            for (group, key, record) in extractor.extract(document)? {
                merged.entry(group.to_string()).or_default().insert(key, record);
            }
            for (group, records) in &merged {
                debug!(group = group.as_str(), count = records.len(), "extraction progress");
            }
        }

        Ok(merged
            .into_iter()
            .map(|(group, keyed)| (group, keyed.into_values().collect()))
            .collect())
    }
}
