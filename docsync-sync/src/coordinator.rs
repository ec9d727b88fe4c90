//! Single-flight sync coordinator.
//!
//! ```text
//!            submit                      submit (payload replaced)
//!   Idle ───────────▶ Attempting ◀───────────────┐
//!    ▲                    │ │                     │
//!    │ outcome, nothing   │ └─────────────────────┘
//!    │ pending            │ outcome, pending → next attempt with latest payload
//!    └────────────────────┘
//! ```
//!
//! The version state, the pending slot and the in-flight flag live behind one
//! mutex. An outcome is applied and the pending slot is checked under the same
//! lock acquisition, so a concurrent `submit` either lands before the check
//! (and is picked up by the running drain task) or after it (and starts a new
//! one). Only the remote write itself runs outside the lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use docsync_core::{Payload, RecordId, SyncOutcome, WorkspaceVersionState};

use crate::error::RemoteError;
use crate::remote::{RemoteStore, WriteRequest};

/// Operator-facing report emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Started { expected_version: u64 },
    Synced { event_version: u64, local_version: u64 },
    NoChanges,
    Conflict,
    Failed { cause: String },
}

impl SyncEvent {
    /// One human-readable line.
    pub fn message(&self) -> String {
        match self {
            SyncEvent::Started { expected_version } => {
                format!("syncing (expected version {expected_version})")
            }
            SyncEvent::Synced { event_version, .. } => {
                format!("synced (event version {event_version})")
            }
            SyncEvent::NoChanges => "no changes detected".to_string(),
            SyncEvent::Conflict => "conflict detected: the remote record changed since this \
                 session started; reload the document from the remote store and restart \
                 the watcher"
                .to_string(),
            SyncEvent::Failed { cause } => format!("sync failed: {cause}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncEvent::Conflict | SyncEvent::Failed { .. })
    }
}

/// Point-in-time view of the coordinator for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub record_id: RecordId,
    pub version: WorkspaceVersionState,
    pub in_flight: bool,
    pub pending: bool,
    pub attempts: u64,
    pub last_outcome: Option<SyncOutcome>,
    pub last_outcome_at: Option<DateTime<Utc>>,
}

struct SlotState {
    version: WorkspaceVersionState,
    pending: Option<Payload>,
    in_flight: bool,
    accepting: bool,
    attempts: u64,
    last_outcome: Option<SyncOutcome>,
    last_outcome_at: Option<DateTime<Utc>>,
}

struct Shared {
    store: Arc<dyn RemoteStore>,
    record_id: RecordId,
    slot: Mutex<SlotState>,
    events: mpsc::UnboundedSender<SyncEvent>,
    idle: watch::Sender<bool>,
}

/// Owns the local version state and serializes remote writes.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SyncCoordinator {
    shared: Arc<Shared>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        record_id: RecordId,
        initial: WorkspaceVersionState,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                store,
                record_id,
                slot: Mutex::new(SlotState {
                    version: initial,
                    pending: None,
                    in_flight: false,
                    accepting: true,
                    attempts: 0,
                    last_outcome: None,
                    last_outcome_at: None,
                }),
                events,
                idle,
            }),
        }
    }

    /// Seed the version state from the remote record, then build the coordinator.
    ///
    /// A record that does not exist yet starts at `{local_version: 1, event_version: 0}`.
    pub async fn bootstrap(
        store: Arc<dyn RemoteStore>,
        record_id: RecordId,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Result<Self, RemoteError> {
        let read_store = store.clone();
        let read_id = record_id.clone();
        let record = tokio::task::spawn_blocking(move || read_store.read_record(&read_id))
            .await
            .map_err(|err| RemoteError::Transport(format!("record read task failed: {err}")))??;

        let initial = match record {
            Some(record) => record.into(),
            None => {
                tracing::info!(record = %record_id, "remote record not found; starting fresh");
                WorkspaceVersionState::default()
            }
        };
        tracing::info!(
            record = %record_id,
            local_version = initial.local_version,
            event_version = initial.event_version,
            "version state seeded",
        );
        Ok(Self::new(store, record_id, initial, events))
    }

    /// Make `payload` the latest pending payload and start an attempt if idle.
    ///
    /// Returns without waiting for the remote write. While an attempt is in
    /// flight the payload only replaces any earlier unsynced one; the running
    /// attempt picks it up when it completes.
    pub async fn submit(&self, payload: Payload) {
        let mut slot = self.shared.slot.lock().await;
        if !slot.accepting {
            tracing::debug!(record = %self.shared.record_id, "coordinator closed; payload ignored");
            return;
        }
        let superseded = slot.pending.replace(payload).is_some();
        if slot.in_flight {
            tracing::debug!(
                record = %self.shared.record_id,
                superseded,
                "attempt in flight; payload held for next attempt",
            );
            return;
        }
        slot.in_flight = true;
        self.shared.idle.send_replace(false);
        drop(slot);

        let shared = self.shared.clone();
        tokio::spawn(shared.drain());
    }

    /// Resolve once no attempt is in flight.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Stop scheduling new attempts and wait for an in-flight one to finish.
    ///
    /// An attempt whose write already started runs to completion. A drain task
    /// that was spawned but has not taken its payload yet writes nothing.
    /// Returns `true` if a payload was still pending and will not be synced.
    pub async fn close(&self) -> bool {
        self.shared.slot.lock().await.accepting = false;
        self.wait_idle().await;
        let left_pending = self.shared.slot.lock().await.pending.is_some();
        if left_pending {
            tracing::warn!(
                record = %self.shared.record_id,
                "shutting down with unsynced local changes",
            );
        }
        left_pending
    }

    pub async fn version(&self) -> WorkspaceVersionState {
        self.shared.slot.lock().await.version
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let slot = self.shared.slot.lock().await;
        CoordinatorSnapshot {
            record_id: self.shared.record_id.clone(),
            version: slot.version,
            in_flight: slot.in_flight,
            pending: slot.pending.is_some(),
            attempts: slot.attempts,
            last_outcome: slot.last_outcome.clone(),
            last_outcome_at: slot.last_outcome_at,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.shared.record_id
    }
}

impl Shared {
    /// Attempt loop: take the pending payload, write it, apply the outcome,
    /// repeat while something new arrived in the meantime.
    async fn drain(self: Arc<Self>) {
        let mut next = self.take_first().await;
        while let Some(request) = next {
            self.emit(SyncEvent::Started {
                expected_version: request.expected_version,
            });
            let outcome = self.attempt(request).await;
            next = self.finish(outcome).await;
        }
    }

    async fn take_first(&self) -> Option<WriteRequest> {
        let mut slot = self.slot.lock().await;
        let request = if slot.accepting {
            self.next_request(&mut slot)
        } else {
            None
        };
        if request.is_none() {
            self.go_idle(&mut slot);
        }
        request
    }

    async fn attempt(&self, request: WriteRequest) -> SyncOutcome {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write_record(&request))
            .await
            .unwrap_or_else(|err| SyncOutcome::TransientFailure {
                cause: format!("write task failed: {err}"),
            })
    }

    /// Apply `outcome` and decide on the next attempt under one lock.
    async fn finish(&self, outcome: SyncOutcome) -> Option<WriteRequest> {
        let mut slot = self.slot.lock().await;
        slot.attempts += 1;
        let event = match &outcome {
            SyncOutcome::Applied { event_version } => {
                slot.version.apply(*event_version);
                SyncEvent::Synced {
                    event_version: *event_version,
                    local_version: slot.version.local_version,
                }
            }
            SyncOutcome::NoChange => SyncEvent::NoChanges,
            SyncOutcome::Conflict => SyncEvent::Conflict,
            SyncOutcome::TransientFailure { cause } => SyncEvent::Failed {
                cause: cause.clone(),
            },
        };
        slot.last_outcome = Some(outcome);
        slot.last_outcome_at = Some(Utc::now());
        self.emit(event);

        let request = if slot.accepting {
            self.next_request(&mut slot)
        } else {
            None
        };
        if request.is_none() {
            self.go_idle(&mut slot);
        }
        request
    }

    fn next_request(&self, slot: &mut SlotState) -> Option<WriteRequest> {
        slot.pending.take().map(|payload| WriteRequest {
            record_id: self.record_id.clone(),
            payload,
            expected_version: slot.version.local_version,
        })
    }

    fn go_idle(&self, slot: &mut SlotState) {
        slot.in_flight = false;
        self.idle.send_replace(true);
    }

    fn emit(&self, event: SyncEvent) {
        match &event {
            SyncEvent::Started { expected_version } => tracing::info!(
                record = %self.record_id,
                expected_version,
                "syncing",
            ),
            SyncEvent::Synced {
                event_version,
                local_version,
            } => tracing::info!(
                record = %self.record_id,
                event_version,
                local_version,
                "synced",
            ),
            SyncEvent::NoChanges => tracing::info!(record = %self.record_id, "no changes detected"),
            SyncEvent::Conflict => tracing::warn!(
                record = %self.record_id,
                "version conflict; reload required before further syncs can apply",
            ),
            SyncEvent::Failed { cause } => tracing::error!(
                record = %self.record_id,
                error = %cause,
                "sync failed",
            ),
        }
        // Nobody listening is fine; the tracing line above still records it.
        let _ = self.events.send(event);
    }
}
