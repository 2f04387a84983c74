// ABOUTME: Defines the immutable change-event vocabulary for the audit log.
// ABOUTME: A ChangeEvent describes one field transition; a RecordedEvent adds the log store's timestamp.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to the record: the field was first written, rewritten, or
/// discarded along with the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "Create"),
            ChangeKind::Update => write!(f, "Update"),
            ChangeKind::Delete => write!(f, "Delete"),
        }
    }
}

/// An immutable description of one field's transition at save time.
///
/// `previous_value` is absent for `Create` events. `Delete` events carry the
/// last value being discarded in `new_value`. Absent options are omitted from
/// the serialized form so payloads stay self-describing across schema
/// evolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl ChangeEvent {
    /// A `Create` event for a field's initial value.
    pub fn create(field: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Create,
            field: field.into(),
            previous_value: None,
            new_value: Some(new_value.into()),
        }
    }

    /// An `Update` event carrying both sides of the transition.
    pub fn update(
        field: impl Into<String>,
        previous_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            field: field.into(),
            previous_value,
            new_value,
        }
    }

    /// A `Delete` event carrying the last value the field held.
    pub fn delete(field: impl Into<String>, last_value: Option<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            field: field.into(),
            previous_value: None,
            new_value: last_value,
        }
    }
}

/// A ChangeEvent as read back from the log store, enriched with the
/// store-assigned creation timestamp. The log store is the authority on
/// ordering and wall-clock time; callers never supply `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    #[serde(flatten)]
    pub change: ChangeEvent,
    pub created_at: DateTime<Utc>,
}
