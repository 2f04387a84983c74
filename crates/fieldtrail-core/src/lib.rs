// ABOUTME: Core library for fieldtrail, containing the user record, change events, and the change detector.
// ABOUTME: This crate is pure domain logic with no I/O; storage and transport live in sibling crates.

pub mod event;
pub mod tracking;
pub mod user;

pub use event::{ChangeEvent, ChangeKind, RecordedEvent};
pub use tracking::{EntryState, FieldSnapshot, TrackedEntry, detect_changes};
pub use user::User;
