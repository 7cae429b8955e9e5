//! Symbolic memory engine core.
//!
//! Memory nodes carry free text, symbolic tags and a trust score. Traces
//! record reasoning episodes whose stages propose mutations (reinforce,
//! decay, create, reroute) against those nodes. This crate holds the data
//! model and the pure algorithms: relevance ranking, mutation rules and
//! drift scoring.
//!
//! Zero I/O: persistence, locking and the mutation cycle live in `sm-store`.

pub mod audit;
pub mod config;
pub mod constants;
pub mod drift;
pub mod mutation;
pub mod node;
pub mod relevance;
pub mod time;
pub mod tokenizer;
pub mod trace;

pub use audit::AuditLogEntry;
pub use config::{Config, DriftConfig, MutationPolicy, RelevanceConfig};
pub use constants::{DECAY_STEP, DEFAULT_TRUST, REINFORCE_STEP};
pub use drift::{
    DriftComponent, DriftScore, DriftSeries, MemorySnapshot, Trend, drift_over, score_drift,
    score_text_drift,
};
pub use mutation::{AppliedMutation, MutationRejection, apply_mutation};
pub use node::{MemoryNode, NodePatch, clamp_trust, normalize_tag};
pub use relevance::{RelevanceMatcher, RelevanceResult};
pub use time::{now_iso8601, now_unix_millis, unix_millis_to_iso8601};
pub use tokenizer::{jaccard, token_set, tokenize};
pub use trace::{
    MutationError, MutationKind, MutationOutcome, MutationOutcomeRecord, MutationSummary,
    SymbolicMutation, SymbolicTrace, TraceStage,
};
