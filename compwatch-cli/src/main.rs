//! compwatch, a controller offset drift monitor.
//!
//! # Usage
//!
//! ```text
//! compwatch run
//! compwatch sync [--machine <id>] [--dry-run] [--json]
//! compwatch status --machine <id> [--json]
//! compwatch read <address> [--tool-start N] [--tool-end M] [--json]
//! ```
//!
//! Configuration comes from `COMPWATCH_*` environment variables, optionally
//! loaded from a `.env` file in the working directory.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{read::ReadArgs, run::RunArgs, status::StatusArgs, sync::SyncArgs};
use compwatch_daemon::Config;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "compwatch",
    version,
    about = "Track tool and work-coordinate offset drift on machine controllers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the monitor in the foreground until Ctrl-C.
    Run(RunArgs),

    /// Run a single pass over the monitored machines.
    Sync(SyncArgs),

    /// Show the stored baselines of one machine.
    Status(StatusArgs),

    /// Read raw registers from one controller (diagnostic, writes nothing).
    Read(ReadArgs),
}

fn load_config() -> Result<Config> {
    Config::load().context("invalid COMPWATCH_* configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;
    match cli.command {
        Commands::Run(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Read(args) => args.run(config),
    }
}
