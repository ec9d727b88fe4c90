//! `docsync stop`: graceful watcher shutdown.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use docsync_watch::{request_stop, WatchError};

/// Arguments for `docsync stop`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Workspace root containing `.docsync/config.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        match request_stop(&self.root) {
            Ok(()) => println!("watcher stop requested"),
            Err(WatchError::NotRunning { .. }) => println!("watcher is not running"),
            Err(err) => return Err(err).context("failed to stop watcher"),
        }
        Ok(())
    }
}
