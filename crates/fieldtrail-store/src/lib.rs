// ABOUTME: Persistence layer for fieldtrail, coordinating the primary store and the event log.
// ABOUTME: Provides the SQLite user store, the stream gateway, the save coordinator, and the retention reaper.

pub mod coordinator;
pub mod gateway;
pub mod reaper;
pub mod sqlite;

pub use coordinator::{SaveCoordinator, SaveError, SaveOutcome, TrackedUser};
pub use gateway::{EventStore, FileEventStore, GatewayError};
pub use reaper::{ReaperHandle, RetentionReaper};
pub use sqlite::{StoreError, UserStore};
