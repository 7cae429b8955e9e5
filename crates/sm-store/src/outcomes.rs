//! Append-only log of mutation outcomes, keyed by `(trace_id, mutation_id)`.
//!
//! Traces stay immutable once saved; the state transition of each mutation
//! from pending to accepted/rejected is recorded here instead.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{Connection, params};

use sm_core::MutationOutcomeRecord;

use crate::error::{Result, StoreError};
use crate::store::Store;

#[derive(Clone)]
pub struct OutcomeLog {
    store: Arc<Store>,
}

impl OutcomeLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Recorded outcomes for one trace in application order.
    pub fn for_trace(&self, trace_id: &str) -> Result<Vec<MutationOutcomeRecord>> {
        read_outcomes(&*self.store.conn()?, trace_id)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .store
            .conn()?
            .query_row("SELECT COUNT(*) FROM mutation_outcomes", [], |row| {
                row.get(0)
            })?;
        Ok(n as usize)
    }
}

pub(crate) fn read_outcomes(
    conn: &Connection,
    trace_id: &str,
) -> Result<Vec<MutationOutcomeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT mutation_id, doc FROM mutation_outcomes
         WHERE trace_id = ?1 ORDER BY rowid",
    )?;
    let rows: Vec<(String, String)> = stmt
        .query_map([trace_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;

    rows.into_iter()
        .map(|(mutation_id, doc)| {
            serde_json::from_str(&doc).map_err(|e| StoreError::CorruptData {
                id: format!("{trace_id}/{mutation_id}"),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Outcomes for one trace keyed by mutation id.
pub(crate) fn outcome_index(
    conn: &Connection,
    trace_id: &str,
) -> Result<HashMap<String, MutationOutcomeRecord>> {
    Ok(read_outcomes(conn, trace_id)?
        .into_iter()
        .map(|r| (r.mutation_id.clone(), r))
        .collect())
}

/// Append one outcome. A second record for the same key is a store error:
/// outcomes transition exactly once.
pub(crate) fn insert_outcome(conn: &Connection, record: &MutationOutcomeRecord) -> Result<()> {
    let doc = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO mutation_outcomes
            (trace_id, mutation_id, stage_index, outcome, doc, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.trace_id,
            record.mutation_id,
            record.stage_index as i64,
            record.outcome.as_str(),
            doc,
            record.recorded_at,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::{MutationKind, MutationOutcome};

    fn record(trace: &str, mutation: &str) -> MutationOutcomeRecord {
        MutationOutcomeRecord {
            trace_id: trace.into(),
            mutation_id: mutation.into(),
            stage_index: 0,
            kind: MutationKind::Decay,
            outcome: MutationOutcome::Accepted,
            target_node_ids: vec!["n1".into()],
            reason: None,
            recorded_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_insert_and_read_in_order() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        {
            let conn = store.conn().unwrap();
            insert_outcome(&conn, &record("t1", "m2")).unwrap();
            insert_outcome(&conn, &record("t1", "m1")).unwrap();
            insert_outcome(&conn, &record("t2", "m1")).unwrap();
        }

        let log = OutcomeLog::new(Arc::clone(&store));
        let ids: Vec<String> = log
            .for_trace("t1")
            .unwrap()
            .into_iter()
            .map(|r| r.mutation_id)
            .collect();
        assert_eq!(ids, vec!["m2", "m1"]);
        assert_eq!(log.count().unwrap(), 3);

        let index = outcome_index(&*store.conn().unwrap(), "t2").unwrap();
        assert!(index.contains_key("m1"));
    }

    #[test]
    fn test_outcome_recorded_once() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        insert_outcome(&conn, &record("t1", "m1")).unwrap();
        assert!(insert_outcome(&conn, &record("t1", "m1")).is_err());
    }
}
