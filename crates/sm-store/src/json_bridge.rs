use std::fs;
use std::path::Path;

use serde::Deserialize;

use sm_core::NodePatch;

use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;

/// Seed files are either a bare node array or a snapshot-shaped object.
/// Each entry is a patch, so re-seeding never resets fields it omits.
#[derive(Deserialize)]
#[serde(untagged)]
enum SeedDocument {
    Nodes(Vec<NodePatch>),
    Snapshot { nodes: Vec<NodePatch> },
}

impl MemoryStore {
    /// Upsert every node in a JSON seed file. Returns how many were written.
    pub fn import_json_file(&self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    pub fn import_json_str(&self, json: &str) -> Result<usize> {
        let doc: SeedDocument = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))?;
        let nodes = match doc {
            SeedDocument::Nodes(nodes) | SeedDocument::Snapshot { nodes } => nodes,
        };
        let count = nodes.len();
        for node in nodes {
            self.upsert(node)?;
        }
        tracing::info!(count, "imported memory nodes");
        Ok(count)
    }

    /// Write every readable node to `path` as a JSON array.
    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self) -> Result<String> {
        let nodes = self.load()?.nodes;
        serde_json::to_string_pretty(&nodes)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use sm_core::MemoryNode;
    use std::sync::Arc;

    fn memory() -> MemoryStore {
        MemoryStore::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let source = memory();
        source
            .upsert(MemoryNode::new("a", "first").with_tags(["hero"]).with_trust(0.8))
            .unwrap();
        source.upsert(MemoryNode::new("b", "second")).unwrap();

        let json = source.export_json_string().unwrap();
        let target = memory();
        assert_eq!(target.import_json_str(&json).unwrap(), 2);

        let a = target.find_by_id("a").unwrap().unwrap();
        assert_eq!(a.trust_score(), 0.8);
        assert!(a.has_tag("hero"));
    }

    #[test]
    fn test_import_snapshot_shape_and_clamps_trust() {
        let mem = memory();
        let json = r#"{"id":"s1","takenAt":"2026-01-01T00:00:00.000Z","nodes":[
            {"id":"n1","content":"x","symbolicTags":[],"trustScore":7.5,
             "createdAt":"2026-01-01T00:00:00.000Z","lastTouchedAt":"2026-01-01T00:00:00.000Z"}]}"#;
        assert_eq!(mem.import_json_str(json).unwrap(), 1);
        assert_eq!(mem.find_by_id("n1").unwrap().unwrap().trust_score(), 1.0);
    }

    #[test]
    fn test_reseed_keeps_earned_trust() {
        let mem = memory();
        mem.upsert(MemoryNode::new("river", "the river").with_trust(0.9))
            .unwrap();

        mem.import_json_str(r#"[{"id":"river","content":"the river","symbolicTags":["Water"]}]"#)
            .unwrap();

        let river = mem.find_by_id("river").unwrap().unwrap();
        assert_eq!(river.trust_score(), 0.9);
        assert!(river.has_tag("water"));
    }

    #[test]
    fn test_import_new_node_without_content_fails() {
        let err = memory().import_json_str(r#"[{"id":"x"}]"#).unwrap_err();
        assert_eq!(err.kind(), "InvalidData");
    }

    #[test]
    fn test_import_rejects_garbage() {
        let err = memory().import_json_str("{\"nope\": 1}").unwrap_err();
        assert_eq!(err.kind(), "InvalidData");
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nodes.json");
        let mem = memory();
        mem.upsert(MemoryNode::new("a", "x")).unwrap();
        mem.export_json_file(&path).unwrap();

        let other = memory();
        assert_eq!(other.import_json_file(&path).unwrap(), 1);
    }
}
