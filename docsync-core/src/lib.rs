//! docsync core library: domain types, workspace configuration, document loading.
//!
//! Public API surface:
//! - [`types`]: record ids, payloads, version state, sync outcomes
//! - [`error`]: [`ConfigError`], [`LoadError`]
//! - [`config`]: workspace config load / save and path helpers
//! - [`loader`]: read and parse the watched document

pub mod config;
pub mod error;
pub mod loader;
pub mod types;

pub use config::WorkspaceConfig;
pub use error::{ConfigError, LoadError};
pub use loader::load_document;
pub use types::{Payload, RecordId, RemoteRecord, SyncOutcome, WorkspaceVersionState};
