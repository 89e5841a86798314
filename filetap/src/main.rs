//! Incremental file ingestion connector.
//!
//! Lists delimited files per configured table, optionally decrypts them
//! with GnuPG and writes SCHEMA / RECORD / STATE messages to stdout.
//!
//! # Security Guarantees
//! - Passphrases and keys are never logged
//! - Decrypted content only touches anonymous temp files
//! - stdout carries only the message stream

use anyhow::{Context, Result};
use clap::Parser;
use filetap::{
    Cli, Command,
    run::{load_catalog, load_config, load_state, run_sync, run_test},
};
use filetap_core::logging::init_logging;
use std::io::BufWriter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    filetap_core::initialize_validators().context("Failed to initialize schema validators")?;

    let config = load_config(&cli.config)?;
    match cli.command() {
        Command::Sync => {
            let catalog_path = cli
                .catalog
                .as_deref()
                .context("sync requires --catalog")?;
            let catalog = load_catalog(catalog_path)?;
            let state = load_state(cli.state.as_deref())?;

            let stdout = BufWriter::new(std::io::stdout());
            let (_, stats, _) = run_sync(config, state, &catalog, stdout)
                .await
                .inspect_err(|e| error!("Sync failed: {:#}", e))?;
            stats.log_summary();
            info!("✓ Sync completed: {} records", stats.total());
        }
        Command::Test => {
            for check in run_test(&config).await? {
                println!("{}: {} matching files", check.table_name, check.files);
            }
        }
    }
    Ok(())
}
