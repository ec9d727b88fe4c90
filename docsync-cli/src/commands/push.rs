//! `docsync push`: one-shot sync.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use docsync_watch::push_blocking;

use super::render_event;

/// Arguments for `docsync push`.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Workspace root containing `.docsync/config.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let summary = push_blocking(&self.root)
            .with_context(|| format!("push failed for {}", self.root.display()))?;

        for event in &summary.events {
            println!("{}", render_event(event, event.message()));
        }

        if !summary.succeeded() {
            bail!("document was not synced");
        }
        println!(
            "local version {}, event version {}",
            summary.version.local_version, summary.version.event_version
        );
        Ok(())
    }
}
