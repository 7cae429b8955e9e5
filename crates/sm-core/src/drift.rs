//! Drift: how far memory (or a document) moved between two snapshots.
//!
//! Every component is a distance in `[0, 1]`, symmetric in its arguments
//! and zero for identical inputs. The overall score is a fixed weighted
//! mean of the components, so it inherits all three properties.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::node::MemoryNode;
use crate::tokenizer::{jaccard, token_set};

const MEMBERSHIP_WEIGHT: f64 = 0.35;
const CONTENT_WEIGHT: f64 = 0.25;
const TRUST_WEIGHT: f64 = 0.20;
const TAGS_WEIGHT: f64 = 0.10;
const ACTIVITY_WEIGHT: f64 = 0.10;

const LEXICAL_WEIGHT: f64 = 0.8;
const LENGTH_WEIGHT: f64 = 0.2;

/// Point-in-time copy of memory state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub id: String,
    pub taken_at: String,
    pub nodes: Vec<MemoryNode>,
}

impl MemorySnapshot {
    pub fn new(nodes: Vec<MemoryNode>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            taken_at: crate::time::now_iso8601(),
            nodes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftComponent {
    pub name: String,
    pub score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftScore {
    pub overall_score: f64,
    pub components: Vec<DriftComponent>,
}

impl DriftScore {
    fn from_weighted(parts: &[(&str, f64, f64)]) -> Self {
        let overall: f64 = parts.iter().map(|(_, weight, score)| weight * score).sum();
        Self {
            overall_score: overall.clamp(0.0, 1.0),
            components: parts
                .iter()
                .map(|(name, _, score)| DriftComponent {
                    name: name.to_string(),
                    score: *score,
                    trend: Trend::Stable,
                })
                .collect(),
        }
    }

    pub fn component(&self, name: &str) -> Option<&DriftComponent> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Compare two memory snapshots. Snapshot ids and capture times are ignored;
/// only node state counts.
pub fn score_drift(a: &MemorySnapshot, b: &MemorySnapshot) -> DriftScore {
    let nodes_a: BTreeMap<&str, &MemoryNode> =
        a.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let nodes_b: BTreeMap<&str, &MemoryNode> =
        b.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let ids_a: BTreeSet<&str> = nodes_a.keys().copied().collect();
    let ids_b: BTreeSet<&str> = nodes_b.keys().copied().collect();
    let membership = 1.0 - jaccard(&ids_a, &ids_b);

    let shared: Vec<(&MemoryNode, &MemoryNode)> = ids_a
        .intersection(&ids_b)
        .map(|id| (nodes_a[id], nodes_b[id]))
        .collect();

    let content = mean_over(&shared, |x, y| {
        1.0 - jaccard(&token_set(&x.content), &token_set(&y.content))
    });
    let trust = mean_over(&shared, |x, y| (x.trust_score() - y.trust_score()).abs());
    let tags = mean_over(&shared, |x, y| {
        1.0 - jaccard(&x.symbolic_tags, &y.symbolic_tags)
    });
    let activity = mean_over(&shared, |x, y| {
        if x.last_touched_at == y.last_touched_at {
            0.0
        } else {
            1.0
        }
    });

    DriftScore::from_weighted(&[
        ("membership", MEMBERSHIP_WEIGHT, membership),
        ("content", CONTENT_WEIGHT, content),
        ("trust", TRUST_WEIGHT, trust),
        ("tags", TAGS_WEIGHT, tags),
        ("activity", ACTIVITY_WEIGHT, activity),
    ])
}

/// Compare two versions of a document.
pub fn score_text_drift(a: &str, b: &str) -> DriftScore {
    let lexical = 1.0 - jaccard(&token_set(a), &token_set(b));
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let longest = len_a.max(len_b);
    let length = if longest == 0 {
        0.0
    } else {
        len_a.abs_diff(len_b) as f64 / longest as f64
    };

    DriftScore::from_weighted(&[
        ("lexical", LEXICAL_WEIGHT, lexical),
        ("length", LENGTH_WEIGHT, length),
    ])
}

fn mean_over<F>(pairs: &[(&MemoryNode, &MemoryNode)], f: F) -> f64
where
    F: Fn(&MemoryNode, &MemoryNode) -> f64,
{
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.iter().map(|(x, y)| f(x, y)).sum::<f64>() / pairs.len() as f64
}

/// Ordered history of drift scores; classifies each new score's trend
/// per component against the previous one.
#[derive(Debug, Clone, Default)]
pub struct DriftSeries {
    epsilon: f64,
    history: Vec<DriftScore>,
}

impl DriftSeries {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            history: Vec::new(),
        }
    }

    /// Append `score`, returning it with trends filled in. The first score
    /// of a series, and components the previous score lacks, are `Stable`.
    pub fn record(&mut self, mut score: DriftScore) -> DriftScore {
        if let Some(prev) = self.history.last() {
            for component in &mut score.components {
                component.trend = match prev.component(&component.name) {
                    Some(p) => classify(component.score - p.score, self.epsilon),
                    None => Trend::Stable,
                };
            }
        }
        self.history.push(score.clone());
        score
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn scores(&self) -> &[DriftScore] {
        &self.history
    }
}

fn classify(delta: f64, epsilon: f64) -> Trend {
    if delta > epsilon {
        Trend::Increasing
    } else if delta < -epsilon {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Drift between each consecutive pair of snapshots, with trends.
pub fn drift_over(snapshots: &[MemorySnapshot], epsilon: f64) -> Vec<DriftScore> {
    let mut series = DriftSeries::new(epsilon);
    snapshots
        .windows(2)
        .map(|pair| series.record(score_drift(&pair[0], &pair[1])))
        .collect()
}
