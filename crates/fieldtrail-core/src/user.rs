// ABOUTME: Defines the User record tracked by the primary store.
// ABOUTME: Owns the canonical field order, text snapshots for diffing, and stream-key derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::{EntryState, FieldSnapshot};

/// A mutable user record. Current state lives exclusively in the primary
/// store; the audit log only ever sees deltas derived from snapshots of
/// these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned rowid. Zero until the first commit assigns it.
    pub id: i64,
    pub email_address: String,
    /// Opaque, pre-hashed credential. Hashing is the caller's concern.
    pub hashed_password: String,
    pub email_verified: bool,
    /// Soft-delete marker. `Some` schedules the record for permanent removal
    /// once the grace window elapses.
    pub removed_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new, not-yet-persisted user.
    pub fn new(email_address: impl Into<String>, hashed_password: impl Into<String>) -> Self {
        Self {
            id: 0,
            email_address: email_address.into(),
            hashed_password: hashed_password.into(),
            email_verified: false,
            removed_at: None,
        }
    }

    /// Assign a new e-mail address. A changed address is no longer verified.
    pub fn set_email_address(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.email_address != value {
            self.email_address = value;
            self.email_verified = false;
        }
    }

    /// The key of this user's event stream.
    pub fn stream_key(&self) -> String {
        format!("user-{}", self.id)
    }

    /// Snapshot every field as canonical text, in declaration order, pairing
    /// current values with the last-persisted ones. The id of a record in
    /// `Added` state is store-generated and not yet finalized, so it is
    /// marked temporary and excluded from change detection.
    pub fn field_snapshots(&self, state: EntryState, persisted: Option<&User>) -> Vec<FieldSnapshot> {
        let id_temporary = matches!(state, EntryState::Added);
        vec![
            FieldSnapshot {
                field: "id",
                previous: persisted.map(|p| p.id.to_string()),
                current: Some(self.id.to_string()),
                temporary: id_temporary,
            },
            FieldSnapshot {
                field: "email_address",
                previous: persisted.map(|p| p.email_address.clone()),
                current: Some(self.email_address.clone()),
                temporary: false,
            },
            FieldSnapshot {
                field: "hashed_password",
                previous: persisted.map(|p| p.hashed_password.clone()),
                current: Some(self.hashed_password.clone()),
                temporary: false,
            },
            FieldSnapshot {
                field: "email_verified",
                previous: persisted.map(|p| p.email_verified.to_string()),
                current: Some(self.email_verified.to_string()),
                temporary: false,
            },
            FieldSnapshot {
                field: "removed_at",
                previous: persisted.and_then(|p| p.removed_at.map(|t| t.to_rfc3339())),
                current: self.removed_at.map(|t| t.to_rfc3339()),
                temporary: false,
            },
        ]
    }
}
