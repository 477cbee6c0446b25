//! Pressport: migrate a WordPress export into a content platform

use anyhow::Result;
use clap::{Parser, Subcommand};
use pressport::{commands, MigrationConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pressport")]
#[command(about = "WordPress export migration pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pressport.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a WordPress XML export into the record store
    Prepare {
        /// Path to the export file
        source: PathBuf,
    },

    /// Upload prepared record groups to the remote platform
    Import {
        /// Groups to import, in order (defaults to attachments, sections,
        /// authors, posts)
        groups: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MigrationConfig::load(&cli.config)?;

    match cli.command {
        Commands::Prepare { source } => commands::prepare::run(&config, &source),
        Commands::Import { groups } => commands::import::run(&config, &groups),
    }
}
