//! Reasoning traces and the mutations they propose.
//!
//! A trace is immutable once saved. Mutation outcomes are never written
//! back into it; the engine records them separately as
//! [`MutationOutcomeRecord`]s keyed by `(trace_id, mutation_id)`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Reinforce,
    Decay,
    Create,
    Reroute,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationKind::Reinforce => "reinforce",
            MutationKind::Decay => "decay",
            MutationKind::Create => "create",
            MutationKind::Reroute => "reroute",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOutcome {
    Accepted,
    Rejected,
    #[default]
    Pending,
}

impl MutationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOutcome::Accepted => "accepted",
            MutationOutcome::Rejected => "rejected",
            MutationOutcome::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(MutationOutcome::Accepted),
            "rejected" => Some(MutationOutcome::Rejected),
            "pending" => Some(MutationOutcome::Pending),
            _ => None,
        }
    }
}

/// One proposed edit against memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolicMutation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    /// A memory node id, or a tag naming every node that carries it.
    pub target_symbol: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub outcome: MutationOutcome,
    /// Tags attached by `create`, or routed onto the target by `reroute`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// `reroute` only: replace the target's tags instead of adding to them.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace_tags: bool,
}

impl SymbolicMutation {
    pub fn new(
        id: impl Into<String>,
        kind: MutationKind,
        target_symbol: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            target_symbol: target_symbol.into(),
            rationale: rationale.into(),
            outcome: MutationOutcome::Pending,
            tags: Vec::new(),
            replace_tags: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn replacing_tags(mut self) -> Self {
        self.replace_tags = true;
        self
    }
}

/// One step of a reasoning episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStage {
    pub step: String,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutations: Option<Vec<SymbolicMutation>>,
}

impl TraceStage {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            output: serde_json::Value::Null,
            insights: None,
            mutations: None,
        }
    }

    pub fn with_mutation(mut self, mutation: SymbolicMutation) -> Self {
        self.mutations.get_or_insert_with(Vec::new).push(mutation);
        self
    }

    pub fn mutations(&self) -> &[SymbolicMutation] {
        self.mutations.as_deref().unwrap_or(&[])
    }
}

/// A record of one reasoning episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolicTrace {
    pub trace_id: String,
    pub input: String,
    /// Stamped with the parse time when the producer omits it.
    #[serde(default = "crate::time::now_iso8601")]
    pub timestamp: String,
    #[serde(default)]
    pub stages: Vec<TraceStage>,
}

impl SymbolicTrace {
    pub fn new(trace_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            input: input.into(),
            timestamp: crate::time::now_iso8601(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: TraceStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Mutations in application order: stage order, then list order.
    /// Yields `(stage_index, mutation)`.
    pub fn ordered_mutations(&self) -> impl Iterator<Item = (usize, &SymbolicMutation)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, stage)| stage.mutations().iter().map(move |m| (i, m)))
    }

    pub fn mutation_count(&self) -> usize {
        self.stages.iter().map(|s| s.mutations().len()).sum()
    }

    /// Structural checks applied before a trace is persisted.
    pub fn validate(&self) -> Result<(), String> {
        if self.trace_id.trim().is_empty() {
            return Err("traceId must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for (stage, m) in self.ordered_mutations() {
            if m.id.trim().is_empty() {
                return Err(format!("stage {stage}: mutation id must not be empty"));
            }
            if !seen.insert(m.id.as_str()) {
                return Err(format!("duplicate mutation id '{}'", m.id));
            }
            if m.outcome != MutationOutcome::Pending {
                return Err(format!(
                    "mutation '{}' must be pending, got {}",
                    m.id,
                    m.outcome.as_str()
                ));
            }
            if m.target_symbol.trim().is_empty() {
                return Err(format!("mutation '{}' has an empty targetSymbol", m.id));
            }
        }
        Ok(())
    }
}

/// Engine-owned record of how one mutation of one trace was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcomeRecord {
    pub trace_id: String,
    pub mutation_id: String,
    pub stage_index: usize,
    pub kind: MutationKind,
    pub outcome: MutationOutcome,
    #[serde(default)]
    pub target_node_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<MutationError>,
    pub recorded_at: String,
}

/// Caller-facing description of a rejected mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationError {
    pub mutation_id: String,
    pub kind: String,
    pub message: String,
}

/// Result of one mutation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationSummary {
    pub trace_id: String,
    pub applied_count: usize,
    pub rejected_count: usize,
    pub mutated_node_ids: Vec<String>,
    pub errors: Vec<MutationError>,
    pub outcomes: Vec<MutationOutcomeRecord>,
    /// True when at least one outcome came from an earlier cycle.
    pub replayed: bool,
}

impl MutationSummary {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            applied_count: 0,
            rejected_count: 0,
            mutated_node_ids: Vec::new(),
            errors: Vec::new(),
            outcomes: Vec::new(),
            replayed: false,
        }
    }

    /// Fold one outcome into the counters. Node ids keep first-seen order.
    pub fn record(&mut self, record: MutationOutcomeRecord, replayed: bool) {
        match record.outcome {
            MutationOutcome::Accepted => {
                self.applied_count += 1;
                for id in &record.target_node_ids {
                    if !self.mutated_node_ids.contains(id) {
                        self.mutated_node_ids.push(id.clone());
                    }
                }
            }
            MutationOutcome::Rejected => {
                self.rejected_count += 1;
                if let Some(err) = &record.reason {
                    self.errors.push(err.clone());
                }
            }
            MutationOutcome::Pending => {}
        }
        self.replayed |= replayed;
        self.outcomes.push(record);
    }

    pub fn is_full_success(&self) -> bool {
        self.rejected_count == 0 && self.errors.is_empty()
    }
}
