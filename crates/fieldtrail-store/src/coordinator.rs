// ABOUTME: The save coordinator: one logical save spanning the primary commit and the log appends.
// ABOUTME: Detects field changes, commits the primary transaction, then appends staged events per record.

use std::sync::Arc;

use fieldtrail_core::{ChangeEvent, EntryState, TrackedEntry, User, detect_changes};
use thiserror::Error;

use crate::gateway::EventStore;
use crate::sqlite::{StoreError, UserStore};

/// Errors surfaced to the caller of a save. Both variants occur before any
/// event is appended, so a failed save leaves no partial audit state.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to snapshot persisted values: {0}")]
    Snapshot(StoreError),

    #[error("primary store commit failed: {0}")]
    Commit(StoreError),
}

/// A record enlisted in a pending save, with how it is about to change.
#[derive(Debug, Clone)]
pub struct TrackedUser {
    pub user: User,
    pub state: EntryState,
}

impl TrackedUser {
    pub fn added(user: User) -> Self {
        Self {
            user,
            state: EntryState::Added,
        }
    }

    pub fn modified(user: User) -> Self {
        Self {
            user,
            state: EntryState::Modified,
        }
    }

    pub fn removed(user: User) -> Self {
        Self {
            user,
            state: EntryState::Removed,
        }
    }
}

/// The result of a successful save: the primary store's affected-row count
/// and the saved records with their store-assigned ids.
#[derive(Debug)]
pub struct SaveOutcome {
    pub rows_affected: usize,
    pub users: Vec<User>,
}

/// Orchestrates one logical save of zero or more tracked records.
///
/// The primary store is the transactional boundary: events are only appended
/// after its commit succeeds. The two durable writes are independent — there
/// is no distributed transaction — so a post-commit append failure leaves
/// durable, correct primary state with an incomplete audit trail for that
/// operation. That window is accepted, logged, and never surfaced to the
/// caller as an error.
pub struct SaveCoordinator {
    store: UserStore,
    gateway: Arc<dyn EventStore>,
}

impl SaveCoordinator {
    pub fn new(store: UserStore, gateway: Arc<dyn EventStore>) -> Self {
        Self { store, gateway }
    }

    /// Run one save: snapshot before-values, detect changes, commit the
    /// primary transaction, then append each record's staged events to its
    /// stream concurrently.
    pub async fn save(&self, mut tracked: Vec<TrackedUser>) -> Result<SaveOutcome, SaveError> {
        let (staged, rows_affected) = {
            let mut conn = self.store.connect().map_err(SaveError::Snapshot)?;

            // Stage events before touching any row. Ids pending assignment are
            // temporary, so detection never depends on the insert below.
            let mut staged: Vec<Vec<ChangeEvent>> = Vec::with_capacity(tracked.len());
            for entry in &tracked {
                let persisted = match entry.state {
                    EntryState::Modified => {
                        UserStore::get(&conn, entry.user.id).map_err(SaveError::Snapshot)?
                    }
                    EntryState::Added | EntryState::Removed => None,
                };
                let snapshot = TrackedEntry {
                    state: entry.state,
                    fields: entry.user.field_snapshots(entry.state, persisted.as_ref()),
                };
                staged.push(detect_changes(&snapshot));
            }

            // Primary commit. On failure nothing has been appended and the
            // caller sees the error.
            let tx = conn
                .transaction()
                .map_err(|e| SaveError::Commit(e.into()))?;
            let mut rows_affected = 0;
            for entry in &mut tracked {
                match entry.state {
                    EntryState::Added => {
                        entry.user.id =
                            UserStore::insert(&tx, &entry.user).map_err(SaveError::Commit)?;
                        rows_affected += 1;
                    }
                    EntryState::Modified => {
                        rows_affected +=
                            UserStore::update(&tx, &entry.user).map_err(SaveError::Commit)?;
                    }
                    EntryState::Removed => {
                        rows_affected +=
                            UserStore::delete(&tx, entry.user.id).map_err(SaveError::Commit)?;
                    }
                }
            }
            tx.commit().map_err(|e| SaveError::Commit(e.into()))?;
            (staged, rows_affected)
        };

        // Append every record's batch concurrently; a failed append costs
        // audit completeness, not the save.
        let appends = tracked.iter().zip(&staged).map(|(entry, events)| {
            let key = entry.user.stream_key();
            let gateway = Arc::clone(&self.gateway);
            async move {
                if let Err(e) = gateway.append(&key, events).await {
                    tracing::warn!("audit append to stream {} failed: {}", key, e);
                }
            }
        });
        futures::future::join_all(appends).await;

        Ok(SaveOutcome {
            rows_affected,
            users: tracked.into_iter().map(|t| t.user).collect(),
        })
    }
}
