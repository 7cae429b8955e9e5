use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};

use sm_core::SymbolicTrace;

use crate::error::{Result, StoreError};
use crate::store::Store;

const PAGE_SIZE: usize = 64;

/// Durable, append-only store of reasoning traces.
#[derive(Clone)]
pub struct TraceStore {
    store: Arc<Store>,
}

impl TraceStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Persist a new trace. Saved traces are never rewritten.
    pub fn save(&self, trace: &SymbolicTrace) -> Result<()> {
        trace.validate().map_err(StoreError::InvalidData)?;
        let doc = serde_json::to_string(trace)?;
        let inserted = self.store.conn()?.execute(
            "INSERT OR IGNORE INTO traces (trace_id, timestamp, doc) VALUES (?1, ?2, ?3)",
            params![trace.trace_id, trace.timestamp, doc],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateTraceId(trace.trace_id.clone()));
        }
        tracing::debug!(
            trace_id = %trace.trace_id,
            mutations = trace.mutation_count(),
            "trace saved"
        );
        Ok(())
    }

    pub fn load_by_id(&self, trace_id: &str) -> Result<Option<SymbolicTrace>> {
        read_trace(&*self.store.conn()?, trace_id)
    }

    /// All traces, oldest first. Rows are fetched a page at a time, so the
    /// iterator sees whatever is committed when each page is read.
    pub fn list_all(&self) -> TraceIter {
        TraceIter {
            store: Arc::clone(&self.store),
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .store
            .conn()?
            .query_row("SELECT COUNT(*) FROM traces", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Import a trace written as a whole JSON file by an external process.
    pub fn import_trace_file(&self, path: &Path) -> Result<SymbolicTrace> {
        let json = std::fs::read_to_string(path)?;
        self.import_trace_str(&json)
    }

    pub fn import_trace_str(&self, json: &str) -> Result<SymbolicTrace> {
        let trace: SymbolicTrace = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidData(format!("trace JSON: {e}")))?;
        self.save(&trace)?;
        Ok(trace)
    }
}

pub(crate) fn read_trace(conn: &Connection, trace_id: &str) -> Result<Option<SymbolicTrace>> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT doc FROM traces WHERE trace_id = ?1",
            [trace_id],
            |row| row.get(0),
        )
        .optional()?;
    doc.map(|d| {
        serde_json::from_str(&d).map_err(|e| StoreError::CorruptData {
            id: trace_id.to_string(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

/// Lazy iterator over stored traces ordered by `(timestamp, rowid)`.
///
/// Yields `Err` only for storage failures; corrupt records are skipped.
pub struct TraceIter {
    store: Arc<Store>,
    cursor: Option<(String, i64)>,
    buffer: VecDeque<(String, String)>,
    done: bool,
}

impl TraceIter {
    fn fetch_page(&mut self) -> Result<()> {
        let conn = self.store.conn()?;
        let rows: Vec<(String, i64, String, String)> = match &self.cursor {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, rowid, trace_id, doc FROM traces
                     ORDER BY timestamp, rowid LIMIT ?1",
                )?;
                stmt.query_map([PAGE_SIZE as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<std::result::Result<_, _>>()?
            }
            Some((ts, rowid)) => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, rowid, trace_id, doc FROM traces
                     WHERE timestamp > ?1 OR (timestamp = ?1 AND rowid > ?2)
                     ORDER BY timestamp, rowid LIMIT ?3",
                )?;
                stmt.query_map(params![ts, rowid, PAGE_SIZE as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<std::result::Result<_, _>>()?
            }
        };

        if rows.len() < PAGE_SIZE {
            self.done = true;
        }
        if let Some((ts, rowid, _, _)) = rows.last() {
            self.cursor = Some((ts.clone(), *rowid));
        }
        self.buffer
            .extend(rows.into_iter().map(|(_, _, id, doc)| (id, doc)));
        Ok(())
    }
}

impl Iterator for TraceIter {
    type Item = Result<SymbolicTrace>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((id, doc)) = self.buffer.pop_front() {
                match serde_json::from_str(&doc) {
                    Ok(trace) => return Some(Ok(trace)),
                    Err(e) => {
                        tracing::warn!("skipping corrupt trace '{id}': {e}");
                        continue;
                    }
                }
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
