//! Watch runtime: change source + debouncer + control socket around a
//! [`docsync_sync::SyncCoordinator`].

pub mod debounce;
mod error;
pub mod protocol;
mod runtime;
mod server;

pub use debounce::{Debouncer, DEFAULT_QUIET_PERIOD};
pub use error::WatchError;
pub use protocol::{exchange, request_status, request_stop, ControlReply, ControlRequest, WatchStatus};
pub use runtime::{
    push_blocking, push_once, run, start_blocking, PushSummary, WatchOptions, WatchReport,
};
