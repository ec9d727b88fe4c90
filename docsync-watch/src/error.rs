use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watch runtime, the one-shot push and the control socket.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] docsync_core::ConfigError),

    #[error("document load failed: {0}")]
    Load(#[from] docsync_core::LoadError),

    #[error("remote store error: {0}")]
    Remote(#[from] docsync_sync::RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot watch {path}: path has no file name")]
    InvalidDocument { path: PathBuf },

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("watcher is not running (no listener on {socket})")]
    NotRunning { socket: PathBuf },

    #[error("a watcher is already running for this workspace (socket {socket})")]
    AlreadyRunning { socket: PathBuf },

    #[error("{task} task failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
