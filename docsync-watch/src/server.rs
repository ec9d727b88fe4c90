//! Control socket server: answers `status` and `stop` for the running watcher.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use docsync_sync::SyncCoordinator;

use crate::error::{io_err, WatchError};
use crate::protocol::{ControlReply, ControlRequest, WatchStatus};

/// Everything a control connection may read or trigger.
pub(crate) struct ControlContext {
    pub coordinator: SyncCoordinator,
    pub document: PathBuf,
    pub started_at: DateTime<Utc>,
    pub shutdown: broadcast::Sender<()>,
}

impl ControlContext {
    pub async fn status(&self) -> WatchStatus {
        WatchStatus {
            pid: std::process::id(),
            document: self.document.clone(),
            started_at: self.started_at,
            coordinator: self.coordinator.snapshot().await,
        }
    }
}

/// Serve control connections on `listener` until shutdown; the socket file is
/// removed on the way out.
pub(crate) async fn serve(
    listener: UnixListener,
    socket: PathBuf,
    context: Arc<ControlContext>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WatchError> {
    let result = accept_until_shutdown(&listener, &socket, context, shutdown_rx).await;
    if let Err(err) = fs::remove_file(&socket) {
        tracing::debug!(socket = %socket.display(), error = %err, "control socket already gone");
    }
    result
}

async fn accept_until_shutdown(
    listener: &UnixListener,
    socket: &Path,
    context: Arc<ControlContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WatchError> {
    loop {
        let stream = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            accepted = listener.accept() => accepted.map_err(|e| io_err(socket, e))?.0,
        };
        let context = context.clone();
        tokio::spawn(async move {
            if let Err(err) = answer(stream, &context).await {
                tracing::warn!(error = %err, "control connection failed");
            }
        });
    }
}

/// Read one request, write one reply.
async fn answer(stream: UnixStream, context: &ControlContext) -> Result<(), WatchError> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    BufReader::new(reader)
        .read_line(&mut line)
        .await
        .map_err(|e| io_err("control socket read", e))?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let request = serde_json::from_str::<ControlRequest>(&line);
    let reply = match &request {
        Ok(ControlRequest::Status) => ControlReply::Status(context.status().await),
        Ok(ControlRequest::Stop) => ControlReply::Stopping,
        Err(err) => ControlReply::Rejected {
            reason: format!("unrecognized request: {err}"),
        },
    };

    let mut bytes = serde_json::to_vec(&reply)?;
    bytes.push(b'\n');
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| io_err("control socket write", e))?;

    // Reply first so the client is not cut off by the shutdown it asked for.
    if matches!(request, Ok(ControlRequest::Stop)) {
        tracing::info!("stop requested over control socket");
        let _ = context.shutdown.send(());
    }
    Ok(())
}

/// Bind `socket`, replacing a file left behind by a watcher that died, but
/// refusing to take over from one that still answers.
pub(crate) fn bind_control_socket(socket: &Path) -> Result<UnixListener, WatchError> {
    if let Some(dir) = socket.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let listener = match UnixListener::bind(socket) {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            if StdUnixStream::connect(socket).is_ok() {
                return Err(WatchError::AlreadyRunning {
                    socket: socket.to_path_buf(),
                });
            }
            tracing::warn!(socket = %socket.display(), "replacing stale control socket");
            fs::remove_file(socket).map_err(|e| io_err(socket, e))?;
            UnixListener::bind(socket).map_err(|e| io_err(socket, e))?
        }
        Err(err) => return Err(io_err(socket, err)),
    };

    restrict_to_owner(socket)?;
    Ok(listener)
}

fn restrict_to_owner(path: &Path) -> Result<(), WatchError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader as StdBufReader, Write};
    use std::os::unix::fs::PermissionsExt;

    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use docsync_core::config::socket_path_at;
    use docsync_core::{Payload, RecordId, RemoteRecord, SyncOutcome, WorkspaceVersionState};
    use docsync_sync::{RemoteError, RemoteStore, WriteRequest};

    use crate::protocol::{request_status, request_stop};

    struct AcceptAll;

    impl RemoteStore for AcceptAll {
        fn read_record(&self, _: &RecordId) -> Result<Option<RemoteRecord>, RemoteError> {
            Ok(Some(RemoteRecord {
                local_version: 4,
                event_version: 10,
            }))
        }

        fn write_record(&self, _: &WriteRequest) -> SyncOutcome {
            SyncOutcome::Applied { event_version: 11 }
        }
    }

    async fn context(shutdown: broadcast::Sender<()>) -> Arc<ControlContext> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = SyncCoordinator::bootstrap(Arc::new(AcceptAll), RecordId::from("ws-01"), tx)
            .await
            .expect("bootstrap");
        Arc::new(ControlContext {
            coordinator,
            document: PathBuf::from("/ws/document.yaml"),
            started_at: Utc::now(),
            shutdown,
        })
    }

    #[tokio::test]
    async fn status_reflects_coordinator_snapshot() {
        let (shutdown, _) = broadcast::channel(1);
        let context = context(shutdown).await;
        context
            .coordinator
            .submit(Payload::try_from(json!({"a": 1})).expect("mapping"))
            .await;
        context.coordinator.wait_idle().await;

        let status = context.status().await;
        assert_eq!(status.pid, std::process::id());
        assert_eq!(status.document, PathBuf::from("/ws/document.yaml"));
        assert_eq!(
            status.coordinator.version,
            WorkspaceVersionState {
                local_version: 5,
                event_version: 11
            }
        );
        assert!(!status.coordinator.in_flight);
        assert_eq!(
            status.coordinator.last_outcome,
            Some(SyncOutcome::Applied { event_version: 11 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_then_stop_over_socket() {
        let root = TempDir::new().expect("root");
        let socket = socket_path_at(root.path());
        let (shutdown, _) = broadcast::channel::<()>(4);
        let mut observer = shutdown.subscribe();
        let listener = bind_control_socket(&socket).expect("bind");
        let server = tokio::spawn(serve(
            listener,
            socket.clone(),
            context(shutdown.clone()).await,
            shutdown.subscribe(),
        ));

        let root_path = root.path().to_path_buf();
        let status = tokio::task::spawn_blocking(move || request_status(&root_path))
        .await
        .expect("join")
        .expect("status");
        assert_eq!(status.coordinator.record_id, RecordId::from("ws-01"));
        assert_eq!(status.coordinator.version.local_version, 4);

        let root_path = root.path().to_path_buf();
        tokio::task::spawn_blocking(move || request_stop(&root_path))
            .await
            .expect("join")
            .expect("stop");
        observer.recv().await.expect("shutdown signal");
        server.await.expect("join").expect("server exits cleanly");
        assert!(!socket.exists(), "socket removed on exit");
    }

    #[tokio::test]
    async fn unknown_command_is_rejected_without_shutdown() {
        let root = TempDir::new().expect("root");
        let socket = socket_path_at(root.path());
        let (shutdown, _) = broadcast::channel::<()>(4);
        let mut observer = shutdown.subscribe();
        let listener = bind_control_socket(&socket).expect("bind");
        let context = context(shutdown.clone()).await;

        let client_socket = socket.clone();
        let client = tokio::task::spawn_blocking(move || {
            let stream = StdUnixStream::connect(&client_socket).expect("connect");
            (&stream).write_all(b"{\"cmd\":\"reload\"}\n").expect("write");
            let mut reply = String::new();
            StdBufReader::new(&stream).read_line(&mut reply).expect("read");
            reply
        });
        let (stream, _) = listener.accept().await.expect("accept");
        answer(stream, &context).await.expect("answer");

        let reply: ControlReply =
            serde_json::from_str(&client.await.expect("join")).expect("reply json");
        assert!(matches!(reply, ControlReply::Rejected { .. }), "got: {reply:?}");
        assert!(observer.try_recv().is_err(), "no shutdown for a rejected request");
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_and_restricted() {
        let root = TempDir::new().expect("root");
        let socket = socket_path_at(root.path());
        drop(bind_control_socket(&socket).expect("first bind"));
        assert!(socket.exists(), "dropped listener leaves the file behind");

        let _listener = bind_control_socket(&socket).expect("rebind over stale file");
        let mode = fs::metadata(&socket).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn live_socket_is_not_taken_over() {
        let root = TempDir::new().expect("root");
        let socket = socket_path_at(root.path());
        let _listener = bind_control_socket(&socket).expect("first bind");

        let err = bind_control_socket(&socket).unwrap_err();
        assert!(matches!(err, WatchError::AlreadyRunning { .. }), "got: {err}");
    }
}
