mod availability;
mod conflict;
mod directory;
mod dispatch;
mod error;
mod lifecycle;
mod messaging;
mod queries;
mod store;
#[cfg(test)]
mod tests;
mod vehicles;

pub use availability::free_windows;
pub use conflict::{find_conflict, validate_window};
pub use directory::resolve_recipient;
pub use dispatch::{Audience, EventContext, recipients_for};
pub use error::{EngineError, ValidationError};
pub use lifecycle::{BookingRequest, TransitionMeta};
pub use messaging::MessageDraft;
pub use queries::{BookingFilter, VehicleFilter};
pub use store::{InMemoryStore, SharedVehicleState};
pub use vehicles::{derive_status, holds_vehicle};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

// ── Group-commit journal writer ──────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the journal. Waits for one append, drains whatever else is already
/// queued, then commits the whole batch with a single fsync.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_control(&mut journal, cmd);
            continue;
        };
        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut journal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut journal, cmd);
        }
    }
}

fn commit_batch(journal: &mut Journal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = journal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flushed = journal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => commit_batch(journal, vec![(event, response)]),
    }
}

// ── Engine ───────────────────────────────────────────────

/// The booking core: store, journal and notification sink.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Serializes notification upserts so the dedup lookup and insert
    /// cannot interleave.
    pub(super) dispatch_lock: Mutex<()>,
    /// Serializes vehicle/user registration uniqueness checks.
    pub(super) registry_lock: Mutex<()>,
    /// Every persist holds this shared; compaction holds it exclusively so
    /// no record can commit between the snapshot and the file swap.
    compaction_gate: RwLock<()>,
}

impl Engine {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = InMemoryStore::new();
        store.replay(&events);
        tracing::info!(
            events = events.len(),
            vehicles = store.vehicle_count(),
            users = store.user_count(),
            "journal replayed"
        );

        Ok(Self {
            store,
            journal_tx,
            notify,
            dispatch_lock: Mutex::new(()),
            registry_lock: Mutex::new(()),
            compaction_gate: RwLock::new(()),
        })
    }

    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let result = async {
            self.journal_tx
                .send(JournalCommand::Append {
                    event: event.clone(),
                    response: tx,
                })
                .await
                .map_err(|_| EngineError::Persistence("journal writer shut down".into()))?;
            rx.await
                .map_err(|_| EngineError::Persistence("journal writer dropped response".into()))?
                .map_err(|e| EngineError::Persistence(e.to_string()))
        }
        .await;
        if let Err(e) = &result {
            metrics::counter!(crate::observability::PERSISTENCE_FAILURES_TOTAL).increment(1);
            tracing::error!("journal append failed: {e}");
        }
        result
    }

    /// Journal first, then mutate. A failed write leaves memory untouched.
    pub(super) async fn persist_vehicle_event(
        &self,
        vs: &mut VehicleState,
        event: Event,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        self.journal_append(&event).await?;
        self.store.apply_to_vehicle(vs, &event);
        Ok(())
    }

    pub(super) async fn persist_global(&self, event: Event) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        self.journal_append(&event).await?;
        self.store.apply_global(&event);
        Ok(())
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub(super) fn vehicle_state(&self, id: &Ulid) -> Result<SharedVehicleState, EngineError> {
        self.store
            .vehicle_state(id)
            .ok_or(EngineError::not_found("vehicle", *id))
    }

    pub(super) fn user(&self, id: &Ulid) -> Result<User, EngineError> {
        self.store
            .user(id)
            .ok_or(EngineError::not_found("user", *id))
    }

    /// Rewrite the journal as the minimal record list that recreates the
    /// current state. Returns `false` without compacting when a vehicle is
    /// locked mid-operation; the caller retries later.
    pub async fn compact_journal(&self) -> Result<bool, EngineError> {
        let _gate = self.compaction_gate.write().await;

        let mut events = Vec::new();
        for user in self.store.users() {
            events.push(Event::UserRegistered(user));
        }
        let mut bookings = Vec::new();
        for state in self.store.vehicle_states() {
            // A writer holding this lock is queued behind the gate.
            let Ok(guard) = state.try_read() else {
                return Ok(false);
            };
            events.push(Event::VehicleRegistered(guard.vehicle.clone()));
            bookings.extend(guard.bookings.iter().cloned().map(Event::BookingCreated));
        }
        events.extend(bookings);
        events.extend(
            self.store
                .notifications()
                .into_iter()
                .map(Event::NotificationUpserted),
        );
        events.extend(self.store.messages().into_iter().map(Event::MessagePosted));

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Persistence("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        Ok(true)
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
