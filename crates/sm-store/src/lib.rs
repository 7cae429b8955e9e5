//! SQLite persistence for symbolic memory: nodes, traces, mutation
//! outcomes and snapshots share one database; the self-audit log is a
//! JSONL file beside it.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod json_bridge;
pub mod layout;
pub mod memory;
pub mod outcomes;
pub mod schema;
pub mod store;
pub mod traces;

pub use audit::AuditLog;
pub use config::load_config;
pub use engine::{CycleGuard, CycleRegistry, MutationEngine};
pub use error::{Result, StoreError};
pub use layout::{DataDir, default_base_dir};
pub use memory::{LoadedNodes, MemoryStore, SkippedRecord};
pub use outcomes::OutcomeLog;
pub use store::Store;
pub use traces::{TraceIter, TraceStore};
