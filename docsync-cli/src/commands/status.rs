//! `docsync status`: query the running watcher.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use docsync_core::config::socket_path_at;
use docsync_watch::{request_status, WatchError, WatchStatus};

/// Arguments for `docsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Workspace root containing `.docsync/config.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Serialize)]
struct StatusJson {
    running: bool,
    socket: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    watcher: Option<WatchStatus>,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let watcher = match request_status(&self.root) {
            Ok(status) => Some(status),
            Err(WatchError::NotRunning { .. }) => None,
            Err(err) => return Err(err).context("failed to query watcher status"),
        };
        let report = StatusJson {
            running: watcher.is_some(),
            socket: socket_path_at(&self.root),
            watcher,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to render status JSON")?
        );
        Ok(())
    }
}
