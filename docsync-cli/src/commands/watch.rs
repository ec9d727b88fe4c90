//! `docsync watch`: foreground watch loop.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tokio::sync::mpsc;

use docsync_watch::{start_blocking, WatchOptions, WatchReport};

use super::render_report;

/// Arguments for `docsync watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Workspace root containing `.docsync/config.yaml`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Quiet period in milliseconds; overrides `quiet_period_ms` from config.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub quiet_ms: Option<u64>,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let options = WatchOptions {
            quiet_period: self.quiet_ms.map(Duration::from_millis),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<WatchReport>();
        let printer = thread::spawn(move || {
            while let Some(report) = rx.blocking_recv() {
                println!("{}", render_report(&report));
            }
        });

        let result = start_blocking(&self.root, options, tx);
        printer
            .join()
            .map_err(|_| anyhow!("report printer thread panicked"))?;
        result.with_context(|| format!("watcher for {} exited with error", self.root.display()))
    }
}
