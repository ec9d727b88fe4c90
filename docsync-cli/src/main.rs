//! docsync: keep one local document synced to a versioned remote record.
//!
//! # Usage
//!
//! ```text
//! docsync watch [--root <dir>] [--quiet-ms <n>]
//! docsync push [--root <dir>]
//! docsync status [--root <dir>]
//! docsync stop [--root <dir>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{push::PushArgs, status::StatusArgs, stop::StopArgs, watch::WatchArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "docsync",
    version,
    about = "Sync a local document to a versioned remote record",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the document and sync it after each burst of edits.
    Watch(WatchArgs),

    /// Load the document once, sync it, and exit.
    Push(PushArgs),

    /// Show the running watcher's version state as JSON.
    Status(StatusArgs),

    /// Ask the running watcher to shut down.
    Stop(StopArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watch(args) => args.run(),
        Commands::Push(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Stop(args) => args.run(),
    }
}
