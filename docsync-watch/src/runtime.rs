use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;

use docsync_core::config::socket_path_at;
use docsync_core::{config, load_document, WorkspaceConfig, WorkspaceVersionState};
use docsync_sync::{HttpRemoteStore, RemoteStore, SyncCoordinator, SyncEvent};

use crate::debounce::Debouncer;
use crate::error::{io_err, WatchError};
use crate::server::{self, ControlContext};

/// Operator-facing report produced while watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchReport {
    Watching {
        document: PathBuf,
        quiet_period: Duration,
    },
    LoadFailed {
        cause: String,
    },
    Sync(SyncEvent),
    Stopped {
        unsynced_changes: bool,
    },
}

impl WatchReport {
    pub fn message(&self) -> String {
        match self {
            WatchReport::Watching {
                document,
                quiet_period,
            } => format!(
                "watching {} (quiet period {} ms)",
                document.display(),
                quiet_period.as_millis()
            ),
            WatchReport::LoadFailed { cause } => format!("failed to load document: {cause}"),
            WatchReport::Sync(event) => event.message(),
            WatchReport::Stopped {
                unsynced_changes: true,
            } => "stopped; the latest local changes were not synced".to_string(),
            WatchReport::Stopped {
                unsynced_changes: false,
            } => "stopped".to_string(),
        }
    }
}

/// Overrides applied on top of the workspace config.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub quiet_period: Option<Duration>,
}

/// Result of a one-shot push.
#[derive(Debug, Clone)]
pub struct PushSummary {
    pub events: Vec<SyncEvent>,
    pub version: WorkspaceVersionState,
}

impl PushSummary {
    pub fn succeeded(&self) -> bool {
        !self.events.iter().any(SyncEvent::is_failure)
    }
}

/// Start the watch runtime and block the current thread until it exits.
pub fn start_blocking(
    root: &Path,
    options: WatchOptions,
    reports: mpsc::UnboundedSender<WatchReport>,
) -> Result<(), WatchError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(root.to_path_buf(), options, reports))
}

/// Run the watch runtime for the workspace at `root`.
///
/// Fails before watching anything if the workspace has no config or the
/// remote record cannot be read.
pub async fn run(
    root: PathBuf,
    options: WatchOptions,
    reports: mpsc::UnboundedSender<WatchReport>,
) -> Result<(), WatchError> {
    let config = config::load_at(&root)?;
    let store: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(&config));
    run_with_store(root, config, options, store, reports).await
}

async fn run_with_store(
    root: PathBuf,
    config: WorkspaceConfig,
    options: WatchOptions,
    store: Arc<dyn RemoteStore>,
    reports: mpsc::UnboundedSender<WatchReport>,
) -> Result<(), WatchError> {
    let document = config.document_path(&root);
    let quiet = options.quiet_period.unwrap_or_else(|| config.quiet_period());

    let (sync_tx, sync_rx) = mpsc::unbounded_channel::<SyncEvent>();
    let coordinator = SyncCoordinator::bootstrap(store, config.record_id.clone(), sync_tx).await?;
    let started_at = Utc::now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (flushed_tx, flushed_rx) = oneshot::channel::<()>();

    // Bound before anything is reported, so `status` works as soon as the
    // operator sees the watcher start.
    let socket = socket_path_at(&root);
    let listener = server::bind_control_socket(&socket)?;

    let forward_handle = tokio::spawn(forward_events(sync_rx, reports.clone(), flushed_rx));

    let mut tasks: JoinSet<(&'static str, Result<(), WatchError>)> = JoinSet::new();
    {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let document = document.clone();
        let coordinator = coordinator.clone();
        let reports = reports.clone();
        tasks.spawn(async move {
            let result = watcher_task(document, quiet, coordinator, reports, shutdown_rx).await;
            let _ = shutdown.send(());
            ("watcher", result)
        });
    }
    {
        let shutdown = shutdown_tx.clone();
        let context = Arc::new(ControlContext {
            coordinator: coordinator.clone(),
            document: document.clone(),
            started_at,
            shutdown: shutdown_tx.clone(),
        });
        let shutdown_rx = shutdown_tx.subscribe();
        tasks.spawn(async move {
            let result = server::serve(listener, socket, context, shutdown_rx).await;
            let _ = shutdown.send(());
            ("control socket", result)
        });
    }
    {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tasks.spawn(async move {
            let result = tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down watcher");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(io_err("ctrl-c handler", err)),
                },
            };
            ("signal", result)
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((task, Err(err))) => {
                tracing::error!(task, error = %err, "watch task failed");
                err
            }
            Err(err) => WatchError::TaskFailed {
                task: "watch runtime",
                reason: err.to_string(),
            },
        };
        let _ = shutdown_tx.send(());
        first_error.get_or_insert(err);
    }

    // No new attempts from here on; an attempt already in flight completes.
    let unsynced_changes = coordinator.close().await;
    drop(coordinator);
    let _ = flushed_tx.send(());
    forward_handle.await.map_err(|err| WatchError::TaskFailed {
        task: "event forwarder",
        reason: err.to_string(),
    })?;
    let _ = reports.send(WatchReport::Stopped { unsynced_changes });

    first_error.map_or(Ok(()), Err)
}

/// Load the document once and push it, blocking the current thread.
pub fn push_blocking(root: &Path) -> Result<PushSummary, WatchError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(push_once(root))
}

/// Load the document once, push it, and wait for the outcome.
pub async fn push_once(root: &Path) -> Result<PushSummary, WatchError> {
    let config = config::load_at(root)?;
    let store: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(&config));
    push_with_store(root, &config, store).await
}

async fn push_with_store(
    root: &Path,
    config: &WorkspaceConfig,
    store: Arc<dyn RemoteStore>,
) -> Result<PushSummary, WatchError> {
    // A load failure means no remote call at all, not even the version read.
    let payload = load_document(&config.document_path(root))?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let coordinator =
        SyncCoordinator::bootstrap(store, config.record_id.clone(), events_tx).await?;
    coordinator.submit(payload).await;
    coordinator.wait_idle().await;
    let version = coordinator.version().await;

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    Ok(PushSummary { events, version })
}

async fn forward_events(
    mut sync_rx: mpsc::UnboundedReceiver<SyncEvent>,
    reports: mpsc::UnboundedSender<WatchReport>,
    mut flushed: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = sync_rx.recv() => {
                let Some(event) = event else { break };
                let _ = reports.send(WatchReport::Sync(event));
            }
            _ = &mut flushed => {
                while let Ok(event) = sync_rx.try_recv() {
                    let _ = reports.send(WatchReport::Sync(event));
                }
                break;
            }
        }
    }
}

async fn watcher_task(
    document: PathBuf,
    quiet: Duration,
    coordinator: SyncCoordinator,
    reports: mpsc::UnboundedSender<WatchReport>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), WatchError> {
    let (tick_tx, tick_rx) = mpsc::unbounded_channel::<()>();
    let _watcher = spawn_change_source(&document, tick_tx)?;

    let _ = reports.send(WatchReport::Watching {
        document: document.clone(),
        quiet_period: quiet,
    });

    // Push whatever is on disk right now before waiting for edits.
    load_and_submit(&document, &coordinator, &reports).await;

    watch_loop(document, quiet, coordinator, tick_rx, reports, shutdown_rx).await;
    Ok(())
}

/// Change ticks → debouncer → loader → coordinator, until shutdown.
async fn watch_loop(
    document: PathBuf,
    quiet: Duration,
    coordinator: SyncCoordinator,
    mut tick_rx: mpsc::UnboundedReceiver<()>,
    reports: mpsc::UnboundedSender<WatchReport>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut debouncer = Debouncer::new(quiet);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            tick = tick_rx.recv() => {
                let Some(()) = tick else { break };
                debouncer.tick();
            }
            () = debouncer.settled() => {
                load_and_submit(&document, &coordinator, &reports).await;
            }
        }
    }
}

async fn load_and_submit(
    document: &Path,
    coordinator: &SyncCoordinator,
    reports: &mpsc::UnboundedSender<WatchReport>,
) {
    let path = document.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || load_document(&path))
        .await
        .map_err(|err| format!("load task join failure: {err}"))
        .and_then(|result| result.map_err(|err| err.to_string()));

    match loaded {
        Ok(payload) => coordinator.submit(payload).await,
        Err(cause) => {
            tracing::warn!(document = %document.display(), error = %cause, "document load failed; cycle skipped");
            let _ = reports.send(WatchReport::LoadFailed { cause });
        }
    }
}

/// Watch the document's parent directory and forward a tick for every
/// create/modify event that touches the document.
///
/// The parent is watched rather than the file so editors that write a temp
/// file and rename it into place are still seen.
fn spawn_change_source(
    document: &Path,
    ticks: mpsc::UnboundedSender<()>,
) -> Result<RecommendedWatcher, WatchError> {
    let file_name = document
        .file_name()
        .ok_or_else(|| WatchError::InvalidDocument {
            path: document.to_path_buf(),
        })?
        .to_os_string();
    let parent = directory_to_watch(document);
    // Canonicalize so FSEvents real paths (e.g. /private/var/... on macOS)
    // compare equal to the target.
    let parent = fs::canonicalize(&parent).map_err(|e| io_err(&parent, e))?;
    let target = parent.join(file_name);

    let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) => {
            if is_relevant_event_kind(&event.kind)
                && event.paths.iter().any(|path| is_target(path, &target))
            {
                let _ = ticks.send(());
            }
        }
        Err(err) => tracing::warn!(error = %err, "watcher event error"),
    })?;
    watcher.watch(&parent, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %parent.display(), "watching document directory");
    Ok(watcher)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_target(path: &Path, target: &Path) -> bool {
    if path == target {
        return true;
    }
    path.file_name() == target.file_name()
        && path
            .parent()
            .and_then(|parent| fs::canonicalize(parent).ok())
            .as_deref()
            == target.parent()
}

fn directory_to_watch(document: &Path) -> PathBuf {
    match document.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Operator lines go to stdout through [`WatchReport`]; structured logs go to
/// stderr and stay quiet unless `RUST_LOG` asks for more.
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
