//! Control socket wire format and the blocking client used by the CLI.
//!
//! Each connection carries exactly one request line and one reply line, both
//! JSON. The watcher runs in the foreground and binds its socket before it
//! reports that it is watching, so a missing or refusing socket means no
//! watcher.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docsync_core::config::socket_path_at;
use docsync_sync::CoordinatorSnapshot;

use crate::error::{io_err, WatchError};

/// How long the client waits for the watcher to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Stop,
}

/// What a running watcher reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStatus {
    pub pid: u32,
    pub document: PathBuf,
    pub started_at: DateTime<Utc>,
    pub coordinator: CoordinatorSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Status(WatchStatus),
    Stopping,
    Rejected { reason: String },
}

/// Send `request` to the watcher of workspace `root` and read its reply.
pub fn exchange(root: &Path, request: ControlRequest) -> Result<ControlReply, WatchError> {
    let socket = socket_path_at(root);
    let stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => WatchError::NotRunning {
            socket: socket.clone(),
        },
        _ => io_err(&socket, err),
    })?;
    stream
        .set_read_timeout(Some(REPLY_TIMEOUT))
        .map_err(|e| io_err(&socket, e))?;

    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    (&stream)
        .write_all(&line)
        .map_err(|e| io_err(&socket, e))?;

    let mut reply = String::new();
    BufReader::new(&stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(&socket, e))?;
    if reply.trim().is_empty() {
        return Err(WatchError::Protocol(
            "watcher hung up without replying".to_string(),
        ));
    }
    Ok(serde_json::from_str(&reply)?)
}

pub fn request_status(root: &Path) -> Result<WatchStatus, WatchError> {
    match exchange(root, ControlRequest::Status)? {
        ControlReply::Status(status) => Ok(status),
        other => Err(unexpected(other)),
    }
}

pub fn request_stop(root: &Path) -> Result<(), WatchError> {
    match exchange(root, ControlRequest::Stop)? {
        ControlReply::Stopping => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: ControlReply) -> WatchError {
    match reply {
        ControlReply::Rejected { reason } => WatchError::Protocol(reason),
        other => WatchError::Protocol(format!("unexpected reply: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use docsync_core::config::run_dir_at;

    #[test]
    fn requests_are_tagged_by_cmd() {
        assert_eq!(
            serde_json::to_value(ControlRequest::Stop).expect("json"),
            json!({"cmd": "stop"})
        );
        let parsed: ControlRequest = serde_json::from_str(r#"{"cmd":"status"}"#).expect("parse");
        assert_eq!(parsed, ControlRequest::Status);
        assert!(serde_json::from_str::<ControlRequest>(r#"{"cmd":"reload"}"#).is_err());
    }

    #[test]
    fn missing_socket_is_not_running() {
        let root = TempDir::new().expect("root");
        let err = exchange(root.path(), ControlRequest::Status).unwrap_err();
        assert!(matches!(err, WatchError::NotRunning { .. }), "got: {err}");
    }

    #[test]
    fn socket_left_by_dead_watcher_is_not_running() {
        let root = TempDir::new().expect("root");
        std::fs::create_dir_all(run_dir_at(root.path())).expect("run dir");
        drop(UnixListener::bind(socket_path_at(root.path())).expect("bind"));

        let err = request_stop(root.path()).unwrap_err();
        assert!(matches!(err, WatchError::NotRunning { .. }), "got: {err}");
    }

    #[test]
    fn rejected_reply_becomes_protocol_error() {
        let root = TempDir::new().expect("root");
        std::fs::create_dir_all(run_dir_at(root.path())).expect("run dir");
        let listener = UnixListener::bind(socket_path_at(root.path())).expect("bind");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut request = String::new();
            BufReader::new(&stream).read_line(&mut request).expect("read");
            (&stream)
                .write_all(b"{\"reply\":\"rejected\",\"reason\":\"busy\"}\n")
                .expect("write");
            request
        });

        let err = request_status(root.path()).unwrap_err();
        assert!(matches!(&err, WatchError::Protocol(reason) if reason == "busy"), "got: {err}");
        assert_eq!(server.join().expect("server").trim(), r#"{"cmd":"status"}"#);
    }
}
