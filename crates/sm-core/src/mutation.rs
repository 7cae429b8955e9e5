//! Mutation rules: how one proposed edit changes the nodes it targets.
//!
//! Target resolution and persistence belong to the caller. These functions
//! only take already-resolved nodes and return their new versions, so a
//! rejected mutation leaves nothing half-applied.

use std::fmt;

use crate::config::MutationPolicy;
use crate::node::{MemoryNode, normalize_tag};
use crate::tokenizer::tokenize;
use crate::trace::{MutationError, MutationKind, SymbolicMutation};

/// Why a single mutation was not applied. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRejection {
    /// No node has the target id (or, outside `create`, the target tag).
    UnknownTarget(String),
    /// The mutation is well-formed JSON but cannot be applied as written.
    InvalidMutation(String),
}

impl MutationRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationRejection::UnknownTarget(_) => "UnknownTarget",
            MutationRejection::InvalidMutation(_) => "InvalidMutation",
        }
    }

    pub fn to_error(&self, mutation_id: &str) -> MutationError {
        MutationError {
            mutation_id: mutation_id.to_string(),
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for MutationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationRejection::UnknownTarget(target) => {
                write!(f, "unknown target symbol: {target}")
            }
            MutationRejection::InvalidMutation(msg) => write!(f, "invalid mutation: {msg}"),
        }
    }
}

/// Nodes produced by applying one mutation, ready to be written back.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMutation {
    pub nodes: Vec<MemoryNode>,
    /// True when a `create` produced a brand-new node.
    pub created: bool,
}

impl AppliedMutation {
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}

/// Apply `mutation` to its resolved `targets`.
///
/// For `create`, `targets` holds the node that already owns the target id,
/// if any. An existing node turns the create into a no-op reinforce: the
/// node is touched and nothing else changes.
pub fn apply_mutation(
    mutation: &SymbolicMutation,
    targets: Vec<MemoryNode>,
    policy: &MutationPolicy,
    now: &str,
) -> Result<AppliedMutation, MutationRejection> {
    match mutation.kind {
        MutationKind::Reinforce => adjust(mutation, targets, policy.reinforce_step, now),
        MutationKind::Decay => adjust(mutation, targets, -policy.decay_step, now),
        MutationKind::Create => Ok(create(mutation, targets, policy, now)),
        MutationKind::Reroute => reroute(mutation, targets, now),
    }
}

fn adjust(
    mutation: &SymbolicMutation,
    mut targets: Vec<MemoryNode>,
    delta: f64,
    now: &str,
) -> Result<AppliedMutation, MutationRejection> {
    if targets.is_empty() {
        return Err(MutationRejection::UnknownTarget(
            mutation.target_symbol.clone(),
        ));
    }
    for node in &mut targets {
        node.adjust_trust(delta);
        node.touch(now);
    }
    Ok(AppliedMutation {
        nodes: targets,
        created: false,
    })
}

fn create(
    mutation: &SymbolicMutation,
    mut existing: Vec<MemoryNode>,
    policy: &MutationPolicy,
    now: &str,
) -> AppliedMutation {
    if let Some(mut node) = existing.pop() {
        node.touch(now);
        return AppliedMutation {
            nodes: vec![node],
            created: false,
        };
    }

    let mut node = MemoryNode::new(mutation.target_symbol.clone(), mutation.rationale.clone())
        .with_tags(clean_tags(&mutation.tags))
        .with_trust(policy.initial_trust);
    node.created_at = now.to_string();
    node.touch(now);
    AppliedMutation {
        nodes: vec![node],
        created: true,
    }
}

fn reroute(
    mutation: &SymbolicMutation,
    mut targets: Vec<MemoryNode>,
    now: &str,
) -> Result<AppliedMutation, MutationRejection> {
    if targets.is_empty() {
        return Err(MutationRejection::UnknownTarget(
            mutation.target_symbol.clone(),
        ));
    }
    let tags = reroute_tags(mutation);
    if tags.is_empty() {
        return Err(MutationRejection::InvalidMutation(format!(
            "reroute '{}' carries no tags and an empty rationale",
            mutation.id
        )));
    }
    for node in &mut targets {
        if mutation.replace_tags {
            node.symbolic_tags.clear();
        }
        node.symbolic_tags.extend(tags.iter().cloned());
        node.touch(now);
    }
    Ok(AppliedMutation {
        nodes: targets,
        created: false,
    })
}

/// Tags a reroute routes onto its targets: the explicit `tags` list, or
/// failing that the rationale's tokens.
pub fn reroute_tags(mutation: &SymbolicMutation) -> Vec<String> {
    let explicit = clean_tags(&mutation.tags);
    if !explicit.is_empty() {
        return explicit;
    }
    tokenize(&mutation.rationale)
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter().filter_map(|t| normalize_tag(t)).collect()
}
