//! Error types for docsync-sync.

use thiserror::Error;

/// Failures of the startup record read.
///
/// Write failures never surface as errors: they are folded into
/// [`docsync_core::SyncOutcome::TransientFailure`] so the watch loop keeps going.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level failure (DNS, connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with an unexpected HTTP status.
    #[error("remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("undecodable remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// One-line cause suitable for operator reports.
    pub fn cause(&self) -> String {
        self.to_string()
    }
}
