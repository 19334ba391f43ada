//! `compwatch run`: foreground daemon.

use anyhow::{Context, Result};
use clap::Args;

use compwatch_daemon::{start_blocking, Config};

/// Arguments for `compwatch run`.
#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub fn run(self, config: Config) -> Result<()> {
        start_blocking(config).context("daemon exited with error")
    }
}
