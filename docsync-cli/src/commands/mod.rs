pub mod push;
pub mod status;
pub mod stop;
pub mod watch;

use colored::{ColoredString, Colorize};
use docsync_sync::SyncEvent;
use docsync_watch::WatchReport;

/// Colored operator line for one report.
pub(crate) fn render_report(report: &WatchReport) -> ColoredString {
    let message = report.message();
    match report {
        WatchReport::Watching { .. } => message.bold(),
        WatchReport::LoadFailed { .. } => message.yellow(),
        WatchReport::Sync(event) => render_event(event, message),
        WatchReport::Stopped {
            unsynced_changes: true,
        } => message.yellow(),
        WatchReport::Stopped {
            unsynced_changes: false,
        } => message.normal(),
    }
}

pub(crate) fn render_event(event: &SyncEvent, message: String) -> ColoredString {
    match event {
        SyncEvent::Started { .. } => message.dimmed(),
        SyncEvent::Synced { .. } => message.green(),
        SyncEvent::NoChanges => message.normal(),
        SyncEvent::Conflict => message.red().bold(),
        SyncEvent::Failed { .. } => message.red(),
    }
}
