//! CLI subcommand glue. No pipeline logic lives here.

pub mod import;
pub mod prepare;
