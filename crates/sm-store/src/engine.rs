//! Mutation cycle: apply the mutations of a saved trace to memory, once.
//!
//! Each mutation commits its node writes together with its outcome record,
//! so a cycle interrupted half-way resumes where it stopped on the next run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use sm_core::{
    MemoryNode, MutationKind, MutationOutcome, MutationOutcomeRecord, MutationPolicy,
    MutationRejection, MutationSummary, SymbolicMutation, apply_mutation, now_iso8601,
};

use crate::error::{Result, StoreError};
use crate::memory::{nodes_with_tag, read_node, write_node};
use crate::outcomes::{insert_outcome, outcome_index};
use crate::store::Store;
use crate::traces::read_trace;

/// Trace ids with a cycle currently running.
#[derive(Debug, Default)]
pub struct CycleRegistry {
    active: Mutex<HashSet<String>>,
}

impl CycleRegistry {
    /// Claim `trace_id`. `None` when another cycle already holds it.
    pub fn try_begin(self: &Arc<Self>, trace_id: &str) -> Option<CycleGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(trace_id.to_string()) {
            return None;
        }
        Some(CycleGuard {
            registry: Arc::clone(self),
            trace_id: trace_id.to_string(),
        })
    }

    pub fn is_active(&self, trace_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(trace_id)
    }
}

/// Releases its trace id when dropped, including on early return.
#[derive(Debug)]
pub struct CycleGuard {
    registry: Arc<CycleRegistry>,
    trace_id: String,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.trace_id);
    }
}

/// Applies trace mutations to the memory store. Cheap to clone; clones
/// share the store and the in-flight registry.
#[derive(Clone)]
pub struct MutationEngine {
    store: Arc<Store>,
    registry: Arc<CycleRegistry>,
    policy: MutationPolicy,
}

impl MutationEngine {
    pub fn new(store: Arc<Store>, policy: MutationPolicy) -> Self {
        Self {
            store,
            registry: Arc::new(CycleRegistry::default()),
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<CycleRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &MutationPolicy {
        &self.policy
    }

    /// Run the mutation cycle for one saved trace.
    ///
    /// Mutations already carrying a recorded outcome are folded into the
    /// summary as-is and marked `replayed`; only the rest are applied.
    pub fn run_mutation_cycle(&self, trace_id: &str) -> Result<MutationSummary> {
        let trace = read_trace(&*self.store.conn()?, trace_id)?
            .ok_or_else(|| StoreError::TraceNotFound(trace_id.to_string()))?;

        let _guard = self
            .registry
            .try_begin(trace_id)
            .ok_or_else(|| StoreError::MutationCycleInProgress(trace_id.to_string()))?;

        let done = outcome_index(&*self.store.conn()?, trace_id)?;
        let mut summary = MutationSummary::new(trace_id);

        for (stage_index, mutation) in trace.ordered_mutations() {
            if let Some(previous) = done.get(&mutation.id) {
                summary.record(previous.clone(), true);
                continue;
            }
            let record = self
                .store
                .transaction(|tx| self.apply_one(tx, trace_id, stage_index, mutation))?;
            summary.record(record, false);
        }

        tracing::info!(
            trace_id,
            applied = summary.applied_count,
            rejected = summary.rejected_count,
            replayed = summary.replayed,
            "mutation cycle complete"
        );
        Ok(summary)
    }

    fn apply_one(
        &self,
        conn: &Connection,
        trace_id: &str,
        stage_index: usize,
        mutation: &SymbolicMutation,
    ) -> Result<MutationOutcomeRecord> {
        let now = now_iso8601();
        let applied = resolve_targets(conn, mutation)?
            .and_then(|targets| apply_mutation(mutation, targets, &self.policy, &now));

        let record = match applied {
            Ok(applied) => {
                for node in &applied.nodes {
                    write_node(conn, node)?;
                }
                tracing::debug!(
                    trace_id,
                    mutation_id = %mutation.id,
                    kind = %mutation.kind,
                    nodes = applied.nodes.len(),
                    "mutation accepted"
                );
                MutationOutcomeRecord {
                    trace_id: trace_id.to_string(),
                    mutation_id: mutation.id.clone(),
                    stage_index,
                    kind: mutation.kind,
                    outcome: MutationOutcome::Accepted,
                    target_node_ids: applied.node_ids(),
                    reason: None,
                    recorded_at: now,
                }
            }
            Err(rejection) => {
                tracing::info!(
                    trace_id,
                    mutation_id = %mutation.id,
                    "mutation rejected: {rejection}"
                );
                MutationOutcomeRecord {
                    trace_id: trace_id.to_string(),
                    mutation_id: mutation.id.clone(),
                    stage_index,
                    kind: mutation.kind,
                    outcome: MutationOutcome::Rejected,
                    target_node_ids: Vec::new(),
                    reason: Some(rejection.to_error(&mutation.id)),
                    recorded_at: now,
                }
            }
        };

        insert_outcome(conn, &record)?;
        Ok(record)
    }
}

/// Node id first, then every node carrying the symbol as a tag. `create`
/// resolves by id only. A corrupt target record rejects the mutation
/// instead of failing the cycle.
fn resolve_targets(
    conn: &Connection,
    mutation: &SymbolicMutation,
) -> Result<std::result::Result<Vec<MemoryNode>, MutationRejection>> {
    let symbol = mutation.target_symbol.as_str();
    match read_node(conn, symbol) {
        Ok(Some(node)) => Ok(Ok(vec![node])),
        Ok(None) if mutation.kind == MutationKind::Create => Ok(Ok(Vec::new())),
        Ok(None) => Ok(Ok(nodes_with_tag(conn, symbol)?)),
        Err(StoreError::CorruptData { id, reason }) => Ok(Err(
            MutationRejection::InvalidMutation(format!("target '{id}' is unreadable: {reason}")),
        )),
        Err(e) => Err(e),
    }
}
