// ABOUTME: The change detector: pure diff logic turning tracked field snapshots into change events.
// ABOUTME: No I/O and no hidden state; the returned batch is the only output.

use crate::event::{ChangeEvent, ChangeKind};

/// How a record is about to change in the pending save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
    Removed,
}

/// One field's before/after values as canonical text. `None` means the value
/// is absent, which is distinct from an empty string. A temporary field holds
/// a store-generated value that is not yet finalized and is excluded from
/// detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSnapshot {
    pub field: &'static str,
    pub previous: Option<String>,
    pub current: Option<String>,
    pub temporary: bool,
}

/// A record's pending mutation: its entry state plus field snapshots in
/// declaration order.
#[derive(Debug, Clone)]
pub struct TrackedEntry {
    pub state: EntryState,
    pub fields: Vec<FieldSnapshot>,
}

/// Produce the ordered event batch for one tracked record.
///
/// - `Added`: one `Create` per field whose current value is set.
/// - `Modified`: one `Update` per field whose value differs from the
///   persisted one; unchanged fields emit nothing, so the log grows with
///   actual change volume rather than field count.
/// - `Removed`: one `Delete` per field, carrying the last value.
pub fn detect_changes(entry: &TrackedEntry) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for field in &entry.fields {
        if field.temporary {
            continue;
        }

        match entry.state {
            EntryState::Added => {
                if let Some(current) = &field.current {
                    events.push(ChangeEvent::create(field.field, current.clone()));
                }
            }
            EntryState::Modified => {
                if field.previous != field.current {
                    events.push(ChangeEvent::update(
                        field.field,
                        field.previous.clone(),
                        field.current.clone(),
                    ));
                }
            }
            EntryState::Removed => {
                events.push(ChangeEvent::delete(field.field, field.current.clone()));
            }
        }
    }

    events
}
