//! Relevance ranking of memory nodes against input text.
//!
//! Pure and stateless: no I/O, no mutation of the nodes it scores.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::RelevanceConfig;
use crate::node::MemoryNode;
use crate::tokenizer::{jaccard, token_set, tokenize};

/// A node paired with its relevance to some input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceResult {
    pub node: MemoryNode,
    pub score: f64,
}

/// Stateless relevance scorer.
pub struct RelevanceMatcher;

impl RelevanceMatcher {
    /// Rank `nodes` by relevance to `input`.
    ///
    /// Ordering is total: score descending, then most recently touched,
    /// then id ascending. Empty `nodes` yields an empty result.
    pub fn find_relevant_memories(
        input: &str,
        nodes: &[MemoryNode],
        config: &RelevanceConfig,
    ) -> Vec<RelevanceResult> {
        if nodes.is_empty() {
            return Vec::new();
        }

        let input_tokens = token_set(input);
        let input_lower = input.to_lowercase();

        let mut results: Vec<RelevanceResult> = nodes
            .iter()
            .map(|node| RelevanceResult {
                score: Self::score_with(&input_tokens, &input_lower, node, config),
                node: node.clone(),
            })
            .filter(|r| r.score >= config.threshold)
            .collect();

        results.sort_by(compare_results);

        if let Some(limit) = config.limit {
            results.truncate(limit);
        }
        results
    }

    /// Relevance of a single node, in `[0, 1]`.
    pub fn score(input: &str, node: &MemoryNode, config: &RelevanceConfig) -> f64 {
        Self::score_with(&token_set(input), &input.to_lowercase(), node, config)
    }

    fn score_with(
        input_tokens: &BTreeSet<String>,
        input_lower: &str,
        node: &MemoryNode,
        config: &RelevanceConfig,
    ) -> f64 {
        let content_tokens = token_set(&node.content);
        // Two empty token sets are not evidence of relevance.
        let lexical = if input_tokens.is_empty() || content_tokens.is_empty() {
            0.0
        } else {
            jaccard(input_tokens, &content_tokens)
        };
        let tag_bonus = if tag_matches(input_tokens, input_lower, node) {
            1.0
        } else {
            0.0
        };

        let raw = config.lexical_weight * lexical + config.tag_weight * tag_bonus;
        if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
    }
}

/// A tag matches when it equals an input token, or (for multi-word or
/// punctuated tags) appears as a substring of the lowercased input.
fn tag_matches(input_tokens: &BTreeSet<String>, input_lower: &str, node: &MemoryNode) -> bool {
    node.symbolic_tags.iter().any(|tag| {
        let tag_lower = tag.trim().to_lowercase();
        if tag_lower.is_empty() {
            return false;
        }
        if input_tokens.contains(&tag_lower) {
            return true;
        }
        let tag_tokens = tokenize(&tag_lower);
        let plain_word = tag_tokens.len() == 1 && tag_tokens[0] == tag_lower;
        !plain_word && input_lower.contains(&tag_lower)
    })
}

fn compare_results(a: &RelevanceResult, b: &RelevanceResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.node.last_touched_at.cmp(&a.node.last_touched_at))
        .then_with(|| a.node.id.cmp(&b.node.id))
}
