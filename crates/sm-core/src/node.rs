use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::DEFAULT_TRUST;
use crate::time::now_iso8601;

/// A unit of symbolic memory.
///
/// `trust_score` is clamped to `[0, 1]` on every path that sets it,
/// including deserialization. Tags are stored trimmed and lowercased. A
/// node at zero trust is a prune candidate but stays in the store until
/// deleted explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    pub id: String,
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub symbolic_tags: BTreeSet<String>,
    #[serde(default = "default_trust", deserialize_with = "deserialize_trust")]
    trust_score: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_touched_at: String,
}

fn default_trust() -> f64 {
    DEFAULT_TRUST
}

fn deserialize_trust<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_trust)
}

fn deserialize_tags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<String>, D::Error> {
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|t| normalize_tag(t)).collect())
}

/// Canonical form of a tag: trimmed and lowercased. Blank tags vanish.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_lowercase())
}

/// Clamp a trust value into `[0, 1]`. NaN collapses to zero.
pub fn clamp_trust(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl MemoryNode {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_iso8601();
        Self {
            id: id.into(),
            content: content.into(),
            symbolic_tags: BTreeSet::new(),
            trust_score: DEFAULT_TRUST,
            created_at: now.clone(),
            last_touched_at: now,
        }
    }

    /// New node with a random v4 UUID as its id.
    pub fn with_generated_id(content: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), content)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag: String = tag.into();
            self.symbolic_tags.extend(normalize_tag(&tag));
        }
        self
    }

    pub fn with_trust(mut self, trust: f64) -> Self {
        self.set_trust(trust);
        self
    }

    pub fn trust_score(&self) -> f64 {
        self.trust_score
    }

    pub fn set_trust(&mut self, trust: f64) {
        self.trust_score = clamp_trust(trust);
    }

    /// Shift trust by `delta`, clamped. Returns the new value.
    pub fn adjust_trust(&mut self, delta: f64) -> f64 {
        self.set_trust(self.trust_score + delta);
        self.trust_score
    }

    pub fn is_prune_candidate(&self) -> bool {
        self.trust_score <= 0.0
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        normalize_tag(tag).is_some_and(|t| self.symbolic_tags.contains(&t))
    }

    /// Refresh `last_touched_at`, even when nothing else changed.
    pub fn touch(&mut self, now: &str) {
        self.last_touched_at = now.to_string();
    }

    /// Merge a patch into this node. Only fields present in the patch
    /// overwrite; tags are unioned and `created_at` is preserved.
    pub fn merge_from(&mut self, patch: NodePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(trust) = patch.trust_score {
            self.set_trust(trust);
        }
        self.symbolic_tags.extend(patch.symbolic_tags);
        if self.created_at.is_empty()
            && let Some(created_at) = patch.created_at
        {
            self.created_at = created_at;
        }
    }
}

/// A partial node as it arrives from a seed file or upsert call. Absent
/// fields leave the stored node untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub symbolic_tags: BTreeSet<String>,
    #[serde(default)]
    pub trust_score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl NodePatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Build a fresh node from the patch. Fails when content is missing,
    /// since a new node has nothing to fall back on.
    pub fn into_node(self, now: &str) -> Result<MemoryNode, String> {
        let content = self
            .content
            .ok_or_else(|| format!("new node '{}' has no content", self.id))?;
        Ok(MemoryNode {
            id: self.id,
            content,
            symbolic_tags: self.symbolic_tags,
            trust_score: clamp_trust(self.trust_score.unwrap_or(DEFAULT_TRUST)),
            created_at: self
                .created_at
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| now.to_string()),
            last_touched_at: now.to_string(),
        })
    }
}

impl From<MemoryNode> for NodePatch {
    fn from(node: MemoryNode) -> Self {
        Self {
            id: node.id,
            content: Some(node.content),
            symbolic_tags: node.symbolic_tags,
            trust_score: Some(node.trust_score),
            created_at: (!node.created_at.is_empty()).then_some(node.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_node_defaults() {
        let node = MemoryNode::new("n1", "the shadow remembers");
        assert_eq!(node.trust_score(), DEFAULT_TRUST);
        assert!(node.symbolic_tags.is_empty());
        assert_eq!(node.created_at, node.last_touched_at);
    }

    #[test]
    fn test_trust_clamped_at_bounds() {
        let mut node = MemoryNode::new("n1", "x");
        assert_eq!(node.adjust_trust(5.0), 1.0);
        assert_eq!(node.adjust_trust(-5.0), 0.0);
        assert!(node.is_prune_candidate());
        node.set_trust(f64::NAN);
        assert_eq!(node.trust_score(), 0.0);
    }

    #[test]
    fn test_adjust_roundtrip() {
        let mut node = MemoryNode::new("n1", "x").with_trust(0.3);
        node.adjust_trust(0.1);
        node.adjust_trust(-0.1);
        assert_relative_eq!(node.trust_score(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_deserialize_clamps_trust() {
        let json = r#"{"id":"a","content":"c","symbolicTags":["x"],"trustScore":1.7}"#;
        let node: MemoryNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.trust_score(), 1.0);
        assert!(node.has_tag("x"));
    }

    #[test]
    fn test_deserialize_missing_trust_defaults() {
        let json = r#"{"id":"a","content":"c"}"#;
        let node: MemoryNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.trust_score(), DEFAULT_TRUST);
    }

    #[test]
    fn test_serialize_camel_case() {
        let node = MemoryNode::new("a", "c").with_tags(["hero"]);
        let value = serde_json::to_value(&node).unwrap();
        assert!(value.get("symbolicTags").is_some());
        assert!(value.get("trustScore").is_some());
        assert!(value.get("lastTouchedAt").is_some());
    }

    #[test]
    fn test_merge_unions_tags_and_keeps_created_at() {
        let mut existing = MemoryNode::new("a", "old").with_tags(["hero"]);
        existing.created_at = "2026-01-01T00:00:00.000Z".to_string();
        let incoming = MemoryNode::new("a", "new")
            .with_tags(["shadow"])
            .with_trust(0.9);

        existing.merge_from(incoming.into());

        assert_eq!(existing.content, "new");
        assert_eq!(existing.trust_score(), 0.9);
        assert!(existing.has_tag("hero") && existing.has_tag("shadow"));
        assert_eq!(existing.created_at, "2026-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_merge_keeps_fields_absent_from_patch() {
        let mut existing = MemoryNode::new("a", "old").with_trust(0.9);
        let patch: NodePatch = serde_json::from_str(r#"{"id":"a","symbolicTags":["x"]}"#).unwrap();

        existing.merge_from(patch);

        assert_eq!(existing.content, "old");
        assert_eq!(existing.trust_score(), 0.9);
        assert!(existing.has_tag("x"));
    }

    #[test]
    fn test_patch_into_node_needs_content() {
        assert!(NodePatch::new("a").into_node("now").is_err());
        let node = NodePatch {
            content: Some("c".into()),
            trust_score: Some(3.0),
            ..NodePatch::new("a")
        }
        .into_node("now")
        .unwrap();
        assert_eq!(node.trust_score(), 1.0);
        assert_eq!(node.created_at, "now");
    }

    #[test]
    fn test_tags_normalized_everywhere() {
        let node = MemoryNode::new("a", "c").with_tags([" Shadow ", "", "HERO"]);
        assert_eq!(
            node.symbolic_tags.iter().map(String::as_str).collect::<Vec<_>>(),
            ["hero", "shadow"]
        );
        assert!(node.has_tag("SHADOW"));

        let parsed: MemoryNode =
            serde_json::from_str(r#"{"id":"a","content":"c","symbolicTags":["Gate","  "]}"#)
                .unwrap();
        assert!(parsed.symbolic_tags.contains("gate"));
        assert_eq!(parsed.symbolic_tags.len(), 1);
    }
}
