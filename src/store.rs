//! Durable event store.
//!
//! A keyed, insertion-ordered queue of [`EventRecord`]s in SQLite. Records
//! survive crashes and suspension; they leave the store only after the sync
//! engine receives a positive acknowledgment (or via explicit purge).
//! Unreadable rows are self-healing: enumeration deletes them instead of
//! surfacing them to the caller.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params};

use crate::error::Result;
use crate::types::{EventKind, EventRecord};

/// SQLite-backed event queue. Cheap to clone; all clones share one
/// connection, and each logical operation holds the connection lock for its
/// whole duration so a drain+count pair observes a single snapshot.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<Mutex<Connection>>,
}

impl EventStore {
    pub(crate) fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Upsert a record under its derived key. A colliding key overwrites the
    /// stored record but keeps its original queue position.
    pub fn put(&self, record: &EventRecord) -> Result<()> {
        let key = record.key();
        let data = serde_json::to_vec(record)?;
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO events (key, kind, data) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, data = excluded.data",
            params![key, record.kind.tag(), data],
        )?;
        Ok(())
    }

    /// Records in insertion order, up to `limit` (0 means unbounded).
    /// Unreadable rows are deleted and skipped.
    pub fn enumerate(&self, limit: usize) -> Result<Vec<(String, EventRecord)>> {
        let conn = self.db.lock().unwrap();
        Self::enumerate_locked(&conn, limit)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.db.lock().unwrap();
        Self::count_locked(&conn)
    }

    /// Removing a nonexistent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM events WHERE key = ?", params![key])?;
        Ok(())
    }

    /// Remove a set of keys in one transaction.
    pub fn remove_all(&self, keys: &[String]) -> Result<()> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM events WHERE key = ?", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Read one batch and the total count under a single transaction, so a
    /// concurrent `put` cannot make the two disagree.
    pub fn drain_batch(&self, limit: usize) -> Result<(Vec<(String, EventRecord)>, u64)> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let batch = Self::enumerate_locked(&tx, limit)?;
        let total = Self::count_locked(&tx)?;
        tx.commit()?;
        Ok((batch, total))
    }

    /// The freshest location sample held in the store, if any.
    pub fn latest_location(&self) -> Result<Option<EventRecord>> {
        let conn = self.db.lock().unwrap();
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT key, data FROM events WHERE kind = ? ORDER BY seq DESC LIMIT 1",
                params![EventKind::Location.tag()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some((key, data)) = row else {
            return Ok(None);
        };
        match serde_json::from_slice::<EventRecord>(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!("[EventStore] Removing unreadable record '{}': {}", key, e);
                conn.execute("DELETE FROM events WHERE key = ?", params![key])?;
                Ok(None)
            }
        }
    }

    /// Drop every queued event. Host-triggered reset only; delivery never
    /// purges speculatively.
    pub fn purge(&self) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM events", [])?;
        Ok(())
    }

    fn enumerate_locked(conn: &Connection, limit: usize) -> Result<Vec<(String, EventRecord)>> {
        let mut good = Vec::new();
        let mut corrupt: Vec<String> = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT key, data FROM events ORDER BY seq")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let data: Vec<u8> = row.get(1)?;
                match serde_json::from_slice::<EventRecord>(&data) {
                    Ok(record) => {
                        good.push((key, record));
                        if limit > 0 && good.len() == limit {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("[EventStore] Removing unreadable record '{}': {}", key, e);
                        corrupt.push(key);
                    }
                }
            }
        }
        for key in &corrupt {
            conn.execute("DELETE FROM events WHERE key = ?", params![key])?;
        }
        Ok(good)
    }

    fn count_locked(conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
