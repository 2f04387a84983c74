// ABOUTME: SQLite-backed primary store holding current user state.
// ABOUTME: Connections are scoped per operation; the reaper's candidate query lives here too.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fieldtrail_core::User;
use rusqlite::{Connection, Row, params};
use thiserror::Error;

/// Errors that can occur against the primary store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The transactional system of record for current user state. Holds only the
/// database path; every operation opens its own connection so concurrent
/// saves and sweeps never share a session.
#[derive(Debug, Clone)]
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    /// Open (or create) the store at the given path and run migrations.
    /// Creates parent directories if they do not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
        };

        let conn = store.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_address TEXT NOT NULL,
                hashed_password TEXT NOT NULL,
                email_verified INTEGER NOT NULL DEFAULT 0,
                removed_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_address
                ON users(email_address);",
        )?;

        Ok(store)
    }

    /// Open a fresh connection scoped to one operation.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(conn)
    }

    /// Fetch a user's last-persisted values by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<User>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, email_address, hashed_password, email_verified, removed_at
             FROM users WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], row_to_user)?;
        match rows.next() {
            Some(user) => Ok(Some(user?)),
            None => Ok(None),
        }
    }

    /// List all users, oldest first.
    pub fn list(conn: &Connection) -> Result<Vec<User>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, email_address, hashed_password, email_verified, removed_at
             FROM users ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Users scheduled for removal at or before the cutoff — the reaper's
    /// sweep candidates.
    pub fn sweep_candidates(
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, email_address, hashed_password, email_verified, removed_at
             FROM users WHERE removed_at IS NOT NULL AND removed_at <= ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![cutoff.to_rfc3339()], row_to_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Insert a new row and return the store-assigned id.
    pub fn insert(conn: &Connection, user: &User) -> Result<i64, StoreError> {
        conn.execute(
            "INSERT INTO users (email_address, hashed_password, email_verified, removed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.email_address,
                user.hashed_password,
                user.email_verified,
                user.removed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Update an existing row by id. Returns the number of rows touched.
    pub fn update(conn: &Connection, user: &User) -> Result<usize, StoreError> {
        let count = conn.execute(
            "UPDATE users
             SET email_address = ?1, hashed_password = ?2, email_verified = ?3, removed_at = ?4
             WHERE id = ?5",
            params![
                user.email_address,
                user.hashed_password,
                user.email_verified,
                user.removed_at.map(|t| t.to_rfc3339()),
                user.id,
            ],
        )?;
        Ok(count)
    }

    /// Delete a row by id. Returns the number of rows touched.
    pub fn delete(conn: &Connection, id: i64) -> Result<usize, StoreError> {
        let count = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(count)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let removed_at: Option<String> = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email_address: row.get(1)?,
        hashed_password: row.get(2)?,
        email_verified: row.get(3)?,
        removed_at: removed_at.and_then(|t| {
            DateTime::parse_from_rfc3339(&t)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> UserStore {
        UserStore::open(&dir.path().join("users.db")).unwrap()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        let user = User::new("a@example.com", "hash");
        let id = UserStore::insert(&conn, &user).unwrap();
        assert!(id > 0);

        let fetched = UserStore::get(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.email_address, "a@example.com");
        assert_eq!(fetched.hashed_password, "hash");
        assert!(!fetched.email_verified);
        assert!(fetched.removed_at.is_none());
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        assert!(UserStore::get(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn update_persists_changes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        let mut user = User::new("a@example.com", "hash");
        user.id = UserStore::insert(&conn, &user).unwrap();

        user.set_email_address("b@example.com");
        user.removed_at = Some(Utc::now());
        let count = UserStore::update(&conn, &user).unwrap();
        assert_eq!(count, 1);

        let fetched = UserStore::get(&conn, user.id).unwrap().unwrap();
        assert_eq!(fetched.email_address, "b@example.com");
        assert!(fetched.removed_at.is_some());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        UserStore::insert(&conn, &User::new("a@example.com", "one")).unwrap();
        let result = UserStore::insert(&conn, &User::new("a@example.com", "two"));
        assert!(result.is_err());
    }

    #[test]
    fn list_returns_all_rows_in_id_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        UserStore::insert(&conn, &User::new("a@example.com", "hash")).unwrap();
        UserStore::insert(&conn, &User::new("b@example.com", "hash")).unwrap();

        let users = UserStore::list(&conn).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email_address, "a@example.com");
        assert_eq!(users[1].email_address, "b@example.com");
    }

    #[test]
    fn sweep_candidates_filters_by_cutoff() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        let mut expired = User::new("expired@example.com", "hash");
        expired.removed_at = Some(Utc::now() - Duration::hours(2));
        UserStore::insert(&conn, &expired).unwrap();

        let mut pending = User::new("pending@example.com", "hash");
        pending.removed_at = Some(Utc::now());
        UserStore::insert(&conn, &pending).unwrap();

        UserStore::insert(&conn, &User::new("active@example.com", "hash")).unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let candidates = UserStore::sweep_candidates(&conn, cutoff).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].email_address, "expired@example.com");
    }

    #[test]
    fn delete_removes_row() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let conn = store.connect().unwrap();

        let id = UserStore::insert(&conn, &User::new("a@example.com", "hash")).unwrap();
        assert_eq!(UserStore::delete(&conn, id).unwrap(), 1);
        assert!(UserStore::get(&conn, id).unwrap().is_none());
        assert_eq!(UserStore::delete(&conn, id).unwrap(), 0);
    }
}
