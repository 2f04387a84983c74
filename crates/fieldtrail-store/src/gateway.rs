// ABOUTME: The event log gateway: append-only JSONL streams, one file per record.
// ABOUTME: Appends batches with fsync, reads backward tolerating corrupt entries, deletes whole streams.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldtrail_core::{ChangeEvent, RecordedEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

/// Errors that can occur at the event log boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("event store unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The append-only store holding each record's event stream. The only
/// component that touches the underlying log storage; safe to share across
/// concurrent operations.
///
/// Appends use an "append regardless of expected version" policy: no
/// optimistic-concurrency check is made against the stream, so concurrent
/// writers are ordered only by the store's own append atomicity.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of events to the stream as one atomic write.
    async fn append(&self, stream_key: &str, events: &[ChangeEvent]) -> Result<(), GatewayError>;

    /// Read up to `limit` most-recently-appended events, newest first, with
    /// their store-assigned creation timestamps. Entries that fail to parse
    /// are dropped rather than failing the read; a missing stream is empty.
    async fn read(&self, stream_key: &str, limit: usize) -> Result<Vec<RecordedEvent>, GatewayError>;

    /// Remove the entire stream. Idempotent: a missing stream is not an
    /// error. Events are never removed individually.
    async fn delete(&self, stream_key: &str) -> Result<(), GatewayError>;
}

/// On-disk envelope for one appended event. The `kind` discriminator always
/// equals the payload event's kind, so future readers can discriminate by
/// type without deserializing the body. `metadata` is reserved and empty.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEvent {
    event_id: Ulid,
    kind: String,
    data: String,
    metadata: String,
    created_at: DateTime<Utc>,
}

/// File-backed event store: one append-only JSONL file per stream under a
/// single root directory.
pub struct FileEventStore {
    root: PathBuf,
}

impl FileEventStore {
    /// Open the store rooted at the given directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Return the store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_path(&self, stream_key: &str) -> PathBuf {
        self.root.join(format!("{stream_key}.jsonl"))
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, stream_key: &str, events: &[ChangeEvent]) -> Result<(), GatewayError> {
        if events.is_empty() {
            return Ok(());
        }

        // Serialize the whole batch up front so a bad event fails before
        // anything is written.
        let mut batch = String::new();
        for event in events {
            let stored = StoredEvent {
                event_id: Ulid::new(),
                kind: event.kind.to_string(),
                data: serde_json::to_string(event)?,
                metadata: "{}".to_string(),
                created_at: Utc::now(),
            };
            batch.push_str(&serde_json::to_string(&stored)?);
            batch.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.stream_path(stream_key))
            .await?;
        file.write_all(batch.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    async fn read(&self, stream_key: &str, limit: usize) -> Result<Vec<RecordedEvent>, GatewayError> {
        let path = self.stream_path(stream_key);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GatewayError::Unavailable(e)),
        };

        let mut recorded = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let stored: StoredEvent = match serde_json::from_str(line) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!("dropping unreadable entry in stream {}: {}", stream_key, e);
                    continue;
                }
            };
            let change: ChangeEvent = match serde_json::from_str(&stored.data) {
                Ok(change) => change,
                Err(e) => {
                    tracing::warn!(
                        "dropping corrupt payload in stream {} (event {}): {}",
                        stream_key,
                        stored.event_id,
                        e
                    );
                    continue;
                }
            };

            recorded.push(RecordedEvent {
                change,
                created_at: stored.created_at,
            });
        }

        // Newest first, capped at the caller's limit.
        let start = recorded.len().saturating_sub(limit);
        let mut tail = recorded.split_off(start);
        tail.reverse();
        Ok(tail)
    }

    async fn delete(&self, stream_key: &str) -> Result<(), GatewayError> {
        match fs::remove_file(self.stream_path(stream_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::Unavailable(e)),
        }
    }
}
