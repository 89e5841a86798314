//! Library module for filetap
//!
//! Exposes the CLI definition and the command runners so they can be
//! exercised without spawning the binary.

pub mod run;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI argument structure
#[derive(Parser)]
#[command(name = "filetap")]
#[command(about = "Incremental file ingestion connector")]
#[command(version)]
#[command(long_about = "
filetap - incremental ingestion of delimited files

Lists files per configured table, optionally decrypts them with GnuPG,
and writes SCHEMA / RECORD / STATE messages as JSON lines on stdout.
Bookmarks are emitted after every file so an interrupted run resumes
after the last complete file.

EXAMPLES:
  filetap --config config.json --catalog catalog.json --state state.json
  filetap --config config.json test
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Connector config file
    #[arg(short, long, value_name = "FILE", env = "FILETAP_CONFIG")]
    pub config: PathBuf,

    /// State file holding bookmarks from a previous run
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Catalog selecting streams and their schemas
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Sync every selected stream (default)
    Sync,
    /// Check the transport and count matching files per table
    Test,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all log output except errors")]
    pub quiet: bool,
}

impl Cli {
    /// The subcommand to run; `sync` when none is given.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Sync)
    }
}
