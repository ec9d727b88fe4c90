//! Workspace-local configuration.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   .docsync/
//!     config.yaml     (remote endpoint, record id, watched file; mode 0600)
//!     run/
//!       watch.sock    (control socket of a running `docsync watch`)
//!   document.yaml     (the watched document; name configurable)
//! ```
//!
//! Every function takes the workspace root explicitly. The CLI resolves it from
//! `--root` or the current directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::RecordId;

pub const CONFIG_DIR: &str = ".docsync";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CONTROL_SOCKET: &str = "watch.sock";

pub const DEFAULT_DOCUMENT: &str = "document.yaml";
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_TOKEN_ENV: &str = "DOCSYNC_TOKEN";

/// Contents of `.docsync/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Base URL of the remote store, e.g. `https://store.example.com/api`.
    pub endpoint: String,
    pub record_id: RecordId,
    /// Watched document, relative to the workspace root.
    #[serde(default = "default_document")]
    pub file: PathBuf,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Environment variable consulted for a bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl WorkspaceConfig {
    pub fn new(endpoint: impl Into<String>, record_id: impl Into<RecordId>) -> Self {
        Self {
            endpoint: endpoint.into(),
            record_id: record_id.into(),
            file: default_document(),
            quiet_period_ms: default_quiet_period_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            token_env: default_token_env(),
        }
    }

    /// Absolute (or root-relative) path of the watched document.
    pub fn document_path(&self, root: &Path) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            root.join(&self.file)
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bearer token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.endpoint.trim().is_empty() {
            return Err(invalid("`endpoint` must not be empty"));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(invalid("`endpoint` must be an http:// or https:// URL"));
        }
        if self.record_id.0.trim().is_empty() {
            return Err(invalid("`record_id` must not be empty"));
        }
        if self.quiet_period_ms == 0 {
            return Err(invalid("`quiet_period_ms` must be greater than zero"));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(invalid(
                "`request_timeout_secs` must be between 1 and 3600",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.docsync/`
pub fn config_dir_at(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR)
}

/// `<root>/.docsync/config.yaml`. Pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    config_dir_at(root).join(CONFIG_FILE)
}

/// `<root>/.docsync/run/`
pub fn run_dir_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("run")
}

/// `<root>/.docsync/run/watch.sock`
pub fn socket_path_at(root: &Path) -> PathBuf {
    run_dir_at(root).join(CONTROL_SOCKET)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate `<root>/.docsync/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path +
/// line context) if malformed, `ConfigError::Invalid` if a field fails validation.
pub fn load_at(root: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: WorkspaceConfig = serde_yaml::from_str(&contents).map_err(|e| {
        ConfigError::Parse {
            path: path.clone(),
            source: e,
        }
    })?;
    config.validate(&path)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<root>/.docsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(root: &Path, config: &WorkspaceConfig) -> Result<(), ConfigError> {
    let dir = config_dir_at(root);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(root);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn default_document() -> PathBuf {
    PathBuf::from(DEFAULT_DOCUMENT)
}

fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
