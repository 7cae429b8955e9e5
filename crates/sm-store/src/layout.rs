use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

const DB_FILE: &str = "memory.db";
const AUDIT_FILE: &str = "audit.jsonl";
const CONFIG_FILE: &str = "config.toml";

/// Default data directory: `~/.symbolic-memory`.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".symbolic-memory")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// On-disk layout of one symbolic memory instance.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StoreError::StorageUnavailable(format!("cannot create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// Use `root` when given, else the default directory.
    pub fn resolve(root: Option<PathBuf>) -> Result<Self> {
        Self::open(root.unwrap_or_else(default_base_dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.root.join(AUDIT_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}
