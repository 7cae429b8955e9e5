use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    // FULL: a committed write survives power loss, not only process crashes.
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // ~400KB between automatic checkpoints (SQLite default is ~4MB).
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory and freshly created databases have no WAL to fold back.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    // Records are stored as JSON documents keyed by id. Columns beside `doc`
    // exist only for ordering and lookup.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memory_nodes (
            id              TEXT PRIMARY KEY,
            doc             TEXT NOT NULL,
            trust_score     REAL NOT NULL DEFAULT 0.5,
            last_touched_at TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS node_tags (
            node_id TEXT NOT NULL,
            tag     TEXT NOT NULL,
            PRIMARY KEY (node_id, tag)
        );

        CREATE TABLE IF NOT EXISTS traces (
            trace_id  TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            doc       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mutation_outcomes (
            trace_id    TEXT NOT NULL,
            mutation_id TEXT NOT NULL,
            stage_index INTEGER NOT NULL,
            outcome     TEXT NOT NULL,
            doc         TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (trace_id, mutation_id)
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id       TEXT PRIMARY KEY,
            taken_at TEXT NOT NULL,
            doc      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tags_tag ON node_tags(tag);
        CREATE INDEX IF NOT EXISTS idx_nodes_trust ON memory_nodes(trust_score);
        CREATE INDEX IF NOT EXISTS idx_traces_timestamp ON traces(timestamp);
        CREATE INDEX IF NOT EXISTS idx_snapshots_taken ON snapshots(taken_at);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
