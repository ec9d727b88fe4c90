//! # docsync-sync
//!
//! Versioned remote writes with single-flight coalescing.
//!
//! [`RemoteStore`] is the client-side contract with the versioned document
//! store; [`HttpRemoteStore`] implements it over HTTP. [`SyncCoordinator`]
//! owns the local version state and guarantees at most one write in flight.

pub mod coordinator;
pub mod error;
pub mod remote;

pub use coordinator::{CoordinatorSnapshot, SyncCoordinator, SyncEvent};
pub use error::RemoteError;
pub use remote::{HttpRemoteStore, RemoteStore, WriteRequest};
