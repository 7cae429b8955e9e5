use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use sm_core::{MemoryNode, MemorySnapshot, NodePatch, normalize_tag, now_iso8601};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// A record `load` could not parse and skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

/// Result of a full load: every parseable node plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedNodes {
    pub nodes: Vec<MemoryNode>,
    pub skipped: Vec<SkippedRecord>,
}

/// Durable collection of memory nodes. Sole owner of node lifecycle.
#[derive(Clone)]
pub struct MemoryStore {
    store: Arc<Store>,
}

impl MemoryStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Read every node. Unparseable records are skipped and reported
    /// rather than failing the whole load.
    pub fn load(&self) -> Result<LoadedNodes> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare("SELECT id, doc FROM memory_nodes ORDER BY id")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut loaded = LoadedNodes::default();
        for (id, doc) in rows {
            match parse_node(&id, &doc) {
                Ok(node) => loaded.nodes.push(node),
                Err(e) => {
                    tracing::warn!("skipping memory node: {e}");
                    loaded.skipped.push(SkippedRecord {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(loaded)
    }

    /// Create the node if its id is new, else merge into the stored one.
    /// Fields absent from the patch keep their stored values.
    /// `last_touched_at` is refreshed either way. Durable on return.
    pub fn upsert(&self, patch: impl Into<NodePatch>) -> Result<MemoryNode> {
        let patch = patch.into();
        if patch.id.trim().is_empty() {
            return Err(StoreError::InvalidData("node id must not be empty".into()));
        }
        let now = now_iso8601();
        self.store.transaction(|tx| {
            let mut merged = match read_node(tx, &patch.id)? {
                Some(mut existing) => {
                    existing.merge_from(patch);
                    existing
                }
                None => patch.into_node(&now).map_err(StoreError::InvalidData)?,
            };
            merged.touch(&now);
            write_node(tx, &merged)?;
            Ok(merged)
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<MemoryNode>> {
        read_node(&*self.store.conn()?, id)
    }

    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<MemoryNode>> {
        nodes_with_tag(&*self.store.conn()?, tag)
    }

    /// Explicit deletion. Returns whether a node was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.store.transaction(|tx| {
            tx.execute("DELETE FROM node_tags WHERE node_id = ?1", [id])?;
            let rows = tx.execute("DELETE FROM memory_nodes WHERE id = ?1", [id])?;
            Ok(rows > 0)
        })
    }

    /// Nodes whose trust has reached zero. Never deleted implicitly.
    pub fn prune_candidates(&self) -> Result<Vec<MemoryNode>> {
        let conn = self.store.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, doc FROM memory_nodes WHERE trust_score <= 0 ORDER BY id")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(parse_skipping(rows))
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .store
            .conn()?
            .query_row("SELECT COUNT(*) FROM memory_nodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Copy of the current state, for drift comparison.
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        Ok(MemorySnapshot::new(self.load()?.nodes))
    }

    /// Persist a snapshot for later drift scoring.
    pub fn save_snapshot(&self, snapshot: &MemorySnapshot) -> Result<()> {
        let doc = serde_json::to_string(snapshot)?;
        self.store.conn()?.execute(
            "INSERT OR REPLACE INTO snapshots (id, taken_at, doc) VALUES (?1, ?2, ?3)",
            params![snapshot.id, snapshot.taken_at, doc],
        )?;
        Ok(())
    }

    /// Stored snapshots, oldest first. Corrupt snapshots are skipped.
    pub fn list_snapshots(&self) -> Result<Vec<MemorySnapshot>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare("SELECT id, doc FROM snapshots ORDER BY taken_at, rowid")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, doc)| match serde_json::from_str(&doc) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!("skipping snapshot '{id}': {e}");
                    None
                }
            })
            .collect())
    }
}

// --- Row helpers, usable inside a caller's transaction ---

fn parse_node(id: &str, doc: &str) -> Result<MemoryNode> {
    serde_json::from_str(doc).map_err(|e| StoreError::CorruptData {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn parse_skipping(rows: Vec<(String, String)>) -> Vec<MemoryNode> {
    rows.into_iter()
        .filter_map(|(id, doc)| match parse_node(&id, &doc) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::warn!("skipping memory node: {e}");
                None
            }
        })
        .collect()
}

pub(crate) fn read_node(conn: &Connection, id: &str) -> Result<Option<MemoryNode>> {
    let doc: Option<String> = conn
        .query_row("SELECT doc FROM memory_nodes WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    doc.map(|d| parse_node(id, &d)).transpose()
}

/// Every node carrying `tag`, ordered by id. Corrupt records are skipped.
/// Tags compare in their normalized form.
pub(crate) fn nodes_with_tag(conn: &Connection, tag: &str) -> Result<Vec<MemoryNode>> {
    let Some(tag) = normalize_tag(tag) else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT n.id, n.doc FROM memory_nodes n
         JOIN node_tags t ON t.node_id = n.id
         WHERE t.tag = ?1 ORDER BY n.id",
    )?;
    let rows: Vec<(String, String)> = stmt
        .query_map([&tag], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(parse_skipping(rows))
}

pub(crate) fn write_node(conn: &Connection, node: &MemoryNode) -> Result<()> {
    let doc = serde_json::to_string(node)?;
    conn.execute(
        "INSERT OR REPLACE INTO memory_nodes (id, doc, trust_score, last_touched_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![node.id, doc, node.trust_score(), node.last_touched_at],
    )?;
    conn.execute("DELETE FROM node_tags WHERE node_id = ?1", [&node.id])?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO node_tags (node_id, tag) VALUES (?1, ?2)")?;
    for tag in &node.symbolic_tags {
        stmt.execute(params![node.id, tag])?;
    }
    Ok(())
}
