/// Trust assigned to nodes created by a `create` mutation or seeded without one.
pub const DEFAULT_TRUST: f64 = 0.5;

/// Trust added by a `reinforce` mutation.
pub const REINFORCE_STEP: f64 = 0.1;

/// Trust removed by a `decay` mutation.
pub const DECAY_STEP: f64 = 0.1;

/// Relevance weight of token-set overlap between input and node content.
pub const LEXICAL_WEIGHT: f64 = 0.7;

/// Relevance weight of a tag appearing in the input.
pub const TAG_WEIGHT: f64 = 0.3;

/// Minimum relevance score kept in results. Scores are never negative,
/// so the default keeps every node.
pub const RELEVANCE_THRESHOLD: f64 = 0.0;

/// Component deltas smaller than this classify as a stable trend.
pub const TREND_EPSILON: f64 = 1e-9;
