//! Tunables for relevance, mutation and drift scoring.
//!
//! Every section defaults independently, so a partial `config.toml`
//! only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DECAY_STEP, DEFAULT_TRUST, LEXICAL_WEIGHT, REINFORCE_STEP, RELEVANCE_THRESHOLD, TAG_WEIGHT,
    TREND_EPSILON,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relevance: RelevanceConfig,
    pub mutation: MutationPolicy,
    pub drift: DriftConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub lexical_weight: f64,
    pub tag_weight: f64,
    /// Nodes scoring strictly below this are dropped.
    pub threshold: f64,
    /// Cap on returned results; `None` returns everything above threshold.
    pub limit: Option<usize>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            lexical_weight: LEXICAL_WEIGHT,
            tag_weight: TAG_WEIGHT,
            threshold: RELEVANCE_THRESHOLD,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationPolicy {
    pub reinforce_step: f64,
    pub decay_step: f64,
    pub initial_trust: f64,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            reinforce_step: REINFORCE_STEP,
            decay_step: DECAY_STEP,
            initial_trust: DEFAULT_TRUST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub trend_epsilon: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            trend_epsilon: TREND_EPSILON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"mutation": {"reinforce_step": 0.2}}"#).unwrap();
        assert_eq!(cfg.mutation.reinforce_step, 0.2);
        assert_eq!(cfg.mutation.decay_step, DECAY_STEP);
        assert_eq!(cfg.relevance, RelevanceConfig::default());
    }
}
