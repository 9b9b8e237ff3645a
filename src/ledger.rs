//! Trip ledger.
//!
//! Append-only sequence of `(timestamp, latitude, longitude)` samples for
//! the currently active trip. Owned exclusively by the trip state machine:
//! appended to while a trip runs, wholly cleared when it ends.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params};

use crate::error::Result;

/// One recorded trip point. Timestamps are epoch seconds and arrive
/// non-decreasing (delivery order from the location collaborator).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerPoint {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// SQLite-backed trip point log, sharing the queue's connection so a
/// trip-ending write to both resources serializes on one lock.
#[derive(Clone)]
pub struct TripLedger {
    db: Arc<Mutex<Connection>>,
}

impl TripLedger {
    pub(crate) fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn append(&self, timestamp: i64, latitude: f64, longitude: f64) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO trip_points (timestamp, latitude, longitude) VALUES (?, ?, ?)",
            params![timestamp, latitude, longitude],
        )?;
        Ok(())
    }

    /// All points in append order.
    pub fn points(&self) -> Result<Vec<LedgerPoint>> {
        let conn = self.db.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT timestamp, latitude, longitude FROM trip_points ORDER BY seq")?;
        let points = stmt
            .query_map([], |row| {
                Ok(LedgerPoint {
                    timestamp: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    /// The most recently appended point, if any.
    pub fn last_point(&self) -> Result<Option<LedgerPoint>> {
        let conn = self.db.lock().unwrap();
        let point = conn
            .query_row(
                "SELECT timestamp, latitude, longitude FROM trip_points
                 ORDER BY seq DESC LIMIT 1",
                [],
                |row| {
                    Ok(LedgerPoint {
                        timestamp: row.get(0)?,
                        latitude: row.get(1)?,
                        longitude: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(point)
    }

    pub fn len(&self) -> Result<u64> {
        let conn = self.db.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM trip_points", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM trip_points", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    fn ledger() -> TripLedger {
        let conn = Connection::open_in_memory().unwrap();
        migrations::init_schema(&conn).unwrap();
        TripLedger::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_append_order_and_clear() {
        let l = ledger();
        assert!(l.is_empty().unwrap());

        l.append(100, 51.0, -0.1).unwrap();
        l.append(101, 51.1, -0.2).unwrap();
        l.append(102, 51.2, -0.3).unwrap();

        let points = l.points().unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, 100);
        assert_eq!(points[2].latitude, 51.2);
        assert_eq!(
            l.last_point().unwrap(),
            Some(LedgerPoint {
                timestamp: 102,
                latitude: 51.2,
                longitude: -0.3
            })
        );

        l.clear().unwrap();
        assert!(l.is_empty().unwrap());
        assert_eq!(l.last_point().unwrap(), None);
    }
}
