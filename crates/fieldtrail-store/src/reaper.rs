// ABOUTME: The retention reaper: a recurring sweep purging soft-deleted users past the grace window.
// ABOUTME: Each run deletes expired rows in one transaction, then drops their event streams best-effort.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::EventStore;
use crate::sqlite::{StoreError, UserStore};

/// A recurring background sweep over the primary store. Runs on its own
/// timer, independent of request traffic, with a fresh connection per run.
///
/// Stream deletions are issued after the primary delete commits and are
/// fire-and-forget relative to each other: one stream failing to delete
/// never blocks the rest of the sweep and never rolls back the row deletes.
pub struct RetentionReaper {
    store: UserStore,
    gateway: Arc<dyn EventStore>,
    grace: chrono::Duration,
    interval: Duration,
}

impl RetentionReaper {
    pub fn new(
        store: UserStore,
        gateway: Arc<dyn EventStore>,
        grace: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            grace,
            interval,
        }
    }

    /// Run a single sweep: find users whose removal timestamp is past the
    /// grace window, delete their rows in one transaction, then delete their
    /// streams. Returns the number of purged users.
    pub async fn sweep_once(&self) -> Result<usize, StoreError> {
        let candidates = {
            let mut conn = self.store.connect()?;
            let cutoff = Utc::now() - self.grace;

            let candidates = UserStore::sweep_candidates(&conn, cutoff)?;
            if candidates.is_empty() {
                return Ok(0);
            }

            let tx = conn.transaction()?;
            for user in &candidates {
                UserStore::delete(&tx, user.id)?;
            }
            tx.commit()?;
            candidates
        };

        let deletions = candidates.iter().map(|user| {
            let key = user.stream_key();
            let gateway = Arc::clone(&self.gateway);
            async move {
                if let Err(e) = gateway.delete(&key).await {
                    tracing::warn!("failed to delete stream {}: {}", key, e);
                }
            }
        });
        futures::future::join_all(deletions).await;

        Ok(candidates.len())
    }

    /// Spawn the recurring sweep loop and return a handle for stopping it.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ReaperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!("retention sweep purged {} users", purged),
                        Err(e) => tracing::error!("retention sweep failed: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

/// Handle to a running reaper. Stopping ceases scheduling new sweeps; an
/// in-flight sweep finishes before the task exits.
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{SaveCoordinator, TrackedUser};
    use crate::gateway::{FileEventStore, GatewayError};
    use async_trait::async_trait;
    use fieldtrail_core::{ChangeEvent, RecordedEvent, User};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: UserStore,
        gateway: Arc<FileEventStore>,
        coordinator: SaveCoordinator,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = UserStore::open(&dir.path().join("users.db")).unwrap();
        let gateway = Arc::new(FileEventStore::open(dir.path().join("streams")).unwrap());
        let coordinator = SaveCoordinator::new(
            store.clone(),
            Arc::clone(&gateway) as Arc<dyn EventStore>,
        );
        Harness {
            _dir: dir,
            store,
            gateway,
            coordinator,
        }
    }

    async fn create_user(h: &Harness, email: &str) -> User {
        let outcome = h
            .coordinator
            .save(vec![TrackedUser::added(User::new(email, "hash"))])
            .await
            .unwrap();
        outcome.users.into_iter().next().unwrap()
    }

    async fn schedule_removal(h: &Harness, mut user: User) -> User {
        user.removed_at = Some(Utc::now());
        let outcome = h
            .coordinator
            .save(vec![TrackedUser::modified(user)])
            .await
            .unwrap();
        outcome.users.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn sweep_purges_expired_users_and_their_streams() {
        let h = harness();

        let user = create_user(&h, "a@example.com").await;
        let user = schedule_removal(&h, user).await;
        assert!(!h.gateway.read(&user.stream_key(), 100).await.unwrap().is_empty());

        let reaper = RetentionReaper::new(
            h.store.clone(),
            Arc::clone(&h.gateway) as Arc<dyn EventStore>,
            chrono::Duration::zero(),
            Duration::from_secs(3600),
        );
        let purged = reaper.sweep_once().await.unwrap();
        assert_eq!(purged, 1);

        let conn = h.store.connect().unwrap();
        assert!(UserStore::get(&conn, user.id).unwrap().is_none());
        assert!(h.gateway.read(&user.stream_key(), 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_spares_users_inside_the_grace_window() {
        let h = harness();

        let user = create_user(&h, "a@example.com").await;
        let user = schedule_removal(&h, user).await;

        let reaper = RetentionReaper::new(
            h.store.clone(),
            Arc::clone(&h.gateway) as Arc<dyn EventStore>,
            chrono::Duration::hours(24),
            Duration::from_secs(3600),
        );
        let purged = reaper.sweep_once().await.unwrap();
        assert_eq!(purged, 0);

        // Still pending purge: present and readable.
        let conn = h.store.connect().unwrap();
        assert!(UserStore::get(&conn, user.id).unwrap().is_some());
        assert!(!h.gateway.read(&user.stream_key(), 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_ignores_active_users() {
        let h = harness();

        let user = create_user(&h, "a@example.com").await;

        let reaper = RetentionReaper::new(
            h.store.clone(),
            Arc::clone(&h.gateway) as Arc<dyn EventStore>,
            chrono::Duration::zero(),
            Duration::from_secs(3600),
        );
        assert_eq!(reaper.sweep_once().await.unwrap(), 0);

        let conn = h.store.connect().unwrap();
        assert!(UserStore::get(&conn, user.id).unwrap().is_some());
    }

    /// Delegates to a real store but fails deletion for chosen streams.
    struct FlakyDeleteStore {
        inner: Arc<FileEventStore>,
        fail_keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventStore for FlakyDeleteStore {
        async fn append(&self, key: &str, events: &[ChangeEvent]) -> Result<(), GatewayError> {
            self.inner.append(key, events).await
        }

        async fn read(&self, key: &str, limit: usize) -> Result<Vec<RecordedEvent>, GatewayError> {
            self.inner.read(key, limit).await
        }

        async fn delete(&self, key: &str) -> Result<(), GatewayError> {
            if self.fail_keys.lock().unwrap().iter().any(|k| k == key) {
                return Err(GatewayError::Unavailable(std::io::Error::other(
                    "stream delete refused",
                )));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn one_failed_stream_delete_does_not_block_the_sweep() {
        let h = harness();

        let first = create_user(&h, "a@example.com").await;
        let first = schedule_removal(&h, first).await;
        let second = create_user(&h, "b@example.com").await;
        let second = schedule_removal(&h, second).await;

        let flaky = Arc::new(FlakyDeleteStore {
            inner: Arc::clone(&h.gateway),
            fail_keys: Mutex::new(vec![first.stream_key()]),
        });

        let reaper = RetentionReaper::new(
            h.store.clone(),
            flaky as Arc<dyn EventStore>,
            chrono::Duration::zero(),
            Duration::from_secs(3600),
        );
        let purged = reaper.sweep_once().await.unwrap();
        assert_eq!(purged, 2);

        // Both rows are gone regardless of the stream failure.
        let conn = h.store.connect().unwrap();
        assert!(UserStore::get(&conn, first.id).unwrap().is_none());
        assert!(UserStore::get(&conn, second.id).unwrap().is_none());

        // The second stream was deleted; the first remains for later cleanup.
        assert!(!h.gateway.read(&first.stream_key(), 100).await.unwrap().is_empty());
        assert!(h.gateway.read(&second.stream_key(), 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn running_reaper_purges_on_its_timer_and_stops_cleanly() {
        let h = harness();

        let user = create_user(&h, "a@example.com").await;
        let user = schedule_removal(&h, user).await;

        let reaper = RetentionReaper::new(
            h.store.clone(),
            Arc::clone(&h.gateway) as Arc<dyn EventStore>,
            chrono::Duration::zero(),
            Duration::from_millis(20),
        );
        let handle = reaper.start();

        // Give the loop a few ticks to run the sweep.
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        let conn = h.store.connect().unwrap();
        assert!(UserStore::get(&conn, user.id).unwrap().is_none());
    }
}
