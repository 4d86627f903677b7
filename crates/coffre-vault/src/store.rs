//! Persistent record store — SQLite-backed collection of sealed records.
//!
//! The store holds ciphertext only; field plaintext never reaches this
//! layer. SQLite gives per-record upsert without partial-write corruption
//! (every mutation commits before the call returns), and `rowid` carries
//! the canonical insertion order: `UPDATE` preserves it, so in-place
//! replacement keeps a record's position.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection};

use crate::credential::AccountCredential;
use crate::error::VaultError;

/// Forward-only SQL migrations, embedded at compile time.
/// Index 0 → version 1.
const MIGRATIONS: &[&str] = &[include_str!("../migrations/001_initial_schema.sql")];

/// Handle to the opened record store.
pub struct RecordStore {
    conn: Connection,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordStore(..)")
    }
}

impl RecordStore {
    /// Open (or create) the store at `path` and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the database cannot be opened
    /// or a migration fails.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (tests, ephemeral sessions).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, VaultError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, VaultError> {
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    /// Apply pending migrations sequentially, each in a transaction with
    /// an atomic `user_version` bump on commit.
    fn run_migrations(&self) -> Result<(), VaultError> {
        let current: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx
                .checked_add(1)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| VaultError::Storage("migration index overflow".into()))?;
            if version <= current {
                continue;
            }
            self.conn
                .execute_batch(&format!(
                    "BEGIN; {sql} PRAGMA user_version = {version}; COMMIT;"
                ))
                .map_err(|e| VaultError::Storage(format!("migration {version} failed: {e}")))?;
        }
        Ok(())
    }

    /// Append a record at the end of the canonical order.
    pub(crate) fn insert(&self, record: &AccountCredential) -> Result<(), VaultError> {
        self.conn.execute(
            "INSERT INTO credentials \
             (id, title, identifier, username_ciphertext, password_ciphertext) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.title,
                record.identifier,
                record.username_ciphertext,
                record.password_ciphertext,
            ],
        )?;
        Ok(())
    }

    /// Load the full collection in insertion order.
    pub(crate) fn load_all(&self) -> Result<Vec<AccountCredential>, VaultError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, identifier, username_ciphertext, password_ciphertext \
             FROM credentials ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AccountCredential {
                id: row.get(0)?,
                title: row.get(1)?,
                identifier: row.get(2)?,
                username_ciphertext: row.get(3)?,
                password_ciphertext: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Fetch one record by id.
    pub(crate) fn find_by_id(&self, id: &str) -> Result<Option<AccountCredential>, VaultError> {
        let result = self.conn.query_row(
            "SELECT id, title, identifier, username_ciphertext, password_ciphertext \
             FROM credentials WHERE id = ?1",
            params![id],
            |row| {
                Ok(AccountCredential {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    identifier: row.get(2)?,
                    username_ciphertext: row.get(3)?,
                    password_ciphertext: row.get(4)?,
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a record in place. `rowid` is untouched, so the record
    /// keeps its position. Returns `false` when no row matched.
    pub(crate) fn replace(&self, record: &AccountCredential) -> Result<bool, VaultError> {
        let changed = self.conn.execute(
            "UPDATE credentials SET title = ?2, identifier = ?3, \
             username_ciphertext = ?4, password_ciphertext = ?5 WHERE id = ?1",
            params![
                record.id,
                record.title,
                record.identifier,
                record.username_ciphertext,
                record.password_ciphertext,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete one record. Returns `false` when no row matched.
    pub(crate) fn delete(&self, id: &str) -> Result<bool, VaultError> {
        let changed = self
            .conn
            .execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Clear the entire collection.
    pub(crate) fn clear(&self) -> Result<(), VaultError> {
        self.conn.execute("DELETE FROM credentials", [])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> AccountCredential {
        AccountCredential {
            id: id.to_string(),
            title: title.to_string(),
            identifier: title.to_lowercase(),
            username_ciphertext: vec![1, 2, 3],
            password_ciphertext: vec![4, 5, 6],
        }
    }

    #[test]
    fn migrations_set_user_version() {
        let store = RecordStore::open_in_memory().expect("open");
        let version: i32 = store
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("pragma");
        assert_eq!(version, 1);
    }

    #[test]
    fn insert_and_load_preserves_order() {
        let store = RecordStore::open_in_memory().expect("open");
        store.insert(&record("a", "First")).expect("insert");
        store.insert(&record("b", "Second")).expect("insert");
        store.insert(&record("c", "Third")).expect("insert");

        let all = store.load_all().expect("load");
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn replace_keeps_position() {
        let store = RecordStore::open_in_memory().expect("open");
        store.insert(&record("a", "First")).expect("insert");
        store.insert(&record("b", "Second")).expect("insert");
        store.insert(&record("c", "Third")).expect("insert");

        let replaced = store.replace(&record("b", "Renamed")).expect("replace");
        assert!(replaced);

        let all = store.load_all().expect("load");
        assert_eq!(all[1].id, "b");
        assert_eq!(all[1].title, "Renamed");
    }

    #[test]
    fn replace_missing_returns_false() {
        let store = RecordStore::open_in_memory().expect("open");
        assert!(!store.replace(&record("ghost", "x")).expect("replace"));
    }

    #[test]
    fn delete_and_clear() {
        let store = RecordStore::open_in_memory().expect("open");
        store.insert(&record("a", "First")).expect("insert");
        store.insert(&record("b", "Second")).expect("insert");

        assert!(store.delete("a").expect("delete"));
        assert!(!store.delete("a").expect("second delete"));
        assert_eq!(store.load_all().expect("load").len(), 1);

        store.clear().expect("clear");
        assert!(store.load_all().expect("load").is_empty());
    }

    #[test]
    fn find_by_id() {
        let store = RecordStore::open_in_memory().expect("open");
        store.insert(&record("a", "First")).expect("insert");
        assert!(store.find_by_id("a").expect("find").is_some());
        assert!(store.find_by_id("zzz").expect("find").is_none());
    }
}
