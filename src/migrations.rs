//! Schema initialization and idempotent migrations.

use log::info;
use rusqlite::{Connection, Result};

/// Initialize the database schema. Safe to call on every open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Durable event queue. seq preserves insertion order across
        -- key-collision overwrites (ON CONFLICT keeps the original seq).
        CREATE TABLE IF NOT EXISTS events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            data BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);

        -- Append-only ledger for the currently active trip.
        CREATE TABLE IF NOT EXISTS trip_points (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL
        );

        -- Key/value settings (used by SqliteConfig).
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    migrate_add_event_kind(conn)?;

    Ok(())
}

/// Migration: add the `kind` column to the events table.
///
/// Early builds stored the kind only inside the JSON blob, which forced a
/// full-table parse to find the freshest location sample. The column is
/// backfilled from the blob via json_extract.
pub fn migrate_add_event_kind(conn: &Connection) -> Result<()> {
    let column_exists: i64 = conn
        .prepare("SELECT COUNT(*) FROM pragma_table_info('events') WHERE name = 'kind'")?
        .query_row([], |row| row.get(0))?;

    if column_exists > 0 {
        return Ok(());
    }

    info!("Running migration: add_event_kind");

    conn.execute("ALTER TABLE events ADD COLUMN kind TEXT", [])?;
    // data is a BLOB of plain JSON text; without the cast SQLite (>=3.45)
    // treats a BLOB argument as JSONB and rejects it as malformed.
    conn.execute(
        "UPDATE events SET kind = COALESCE(json_extract(CAST(data AS TEXT), '$.kind'), 'location')",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind)",
        [],
    )?;

    info!("Migration add_event_kind completed successfully");

    Ok(())
}
