use std::sync::Arc;

use anyhow::{Context, Result};

use sm_core::{AuditLogEntry, Config, MutationSummary};
use sm_store::{
    AuditLog, DataDir, MemoryStore, MutationEngine, OutcomeLog, Store, TraceStore, load_config,
};

/// Every long-lived handle the binary needs, opened once and shared by the
/// CLI commands and the HTTP server.
pub struct App {
    pub store: Arc<Store>,
    pub memory: MemoryStore,
    pub traces: TraceStore,
    pub outcomes: OutcomeLog,
    pub engine: MutationEngine,
    pub audit: AuditLog,
    pub config: Config,
}

impl App {
    pub fn open(data: &DataDir) -> Result<Self> {
        let config = load_config(&data.config_path()).context("failed to load config.toml")?;
        let store = Store::open(&data.db_path())
            .with_context(|| format!("failed to open {}", data.db_path().display()))?;
        let audit = AuditLog::open(&data.audit_path()).context("failed to open audit log")?;
        tracing::debug!(root = %data.root().display(), "data directory opened");
        Ok(Self::assemble(Arc::new(store), audit, config))
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let store = Store::open_in_memory().expect("in-memory store");
        Self::assemble(Arc::new(store), AuditLog::in_memory(), Config::default())
    }

    fn assemble(store: Arc<Store>, audit: AuditLog, config: Config) -> Self {
        Self {
            memory: MemoryStore::new(Arc::clone(&store)),
            traces: TraceStore::new(Arc::clone(&store)),
            outcomes: OutcomeLog::new(Arc::clone(&store)),
            engine: MutationEngine::new(Arc::clone(&store), config.mutation.clone()),
            store,
            audit,
            config,
        }
    }

    /// Run a mutation cycle and note it in the self-audit log.
    pub fn run_mutation_cycle(&self, trace_id: &str) -> sm_store::Result<MutationSummary> {
        let summary = self.engine.run_mutation_cycle(trace_id)?;
        self.audit.log_self_audit(
            AuditLogEntry::new(
                "mutation_cycle",
                format!(
                    "trace {trace_id}: {} applied, {} rejected",
                    summary.applied_count, summary.rejected_count
                ),
            )
            .with_details(serde_json::json!({
                "traceId": trace_id,
                "mutatedNodeIds": summary.mutated_node_ids,
                "replayed": summary.replayed,
            })),
        );
        Ok(summary)
    }

    /// Flush the audit log and fold the WAL back into the database.
    pub fn shutdown(&self) {
        self.audit.flush();
        if let Err(e) = self.store.checkpoint_truncate() {
            tracing::warn!("WAL checkpoint failed: {e}");
        }
        tracing::info!("shutdown complete");
    }
}
