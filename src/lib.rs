//! Pressport: WordPress export migration pipeline
//!
//! Migrates content (posts, authors, sections, media) from a WordPress XML
//! export into a rate-limited content-platform API, in two independent
//! stages:
//! - **Preparation**: streaming parse of the export (with sanitize-retry for
//!   corrupted bytes), export-dialect validation, multi-extractor aggregation
//!   with last-write-wins merge, persisted as grouped records.
//! - **Import**: per-group idempotent upload through a sliding-window
//!   rate-limited HTTP client, with per-record failure isolation and a
//!   durable source-key -> remote-response mapping that makes re-runs safe.

pub mod api;
pub mod commands;
pub mod config;
pub mod importer;
pub mod preparation;
pub mod store;
pub mod types;

pub use config::MigrationConfig;
pub use types::Record;
