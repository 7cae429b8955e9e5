//! Append-only self-audit log: in-process list mirrored to a JSONL file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use sm_core::AuditLogEntry;

use crate::error::Result;

struct AuditInner {
    entries: Vec<AuditLogEntry>,
    writer: Option<BufWriter<File>>,
}

pub struct AuditLog {
    inner: Mutex<AuditInner>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open the log at `path`, replaying any lines already there.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = if path.exists() {
            replay(path)?
        } else {
            Vec::new()
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "audit log opened");

        Ok(Self {
            inner: Mutex::new(AuditInner {
                entries,
                writer: Some(BufWriter::new(file)),
            }),
            path: Some(path.to_path_buf()),
        })
    }

    /// Log with no backing file.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(AuditInner {
                entries: Vec::new(),
                writer: None,
            }),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // A panic while holding the lock leaves the entry list intact, so a
    // poisoned lock is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, AuditInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry. Never fails: a file write error is logged and the
    /// entry is still kept in memory.
    pub fn log_self_audit(&self, entry: AuditLogEntry) -> AuditLogEntry {
        let mut inner = self.lock();
        if let Some(writer) = inner.writer.as_mut() {
            let written = serde_json::to_string(&entry)
                .map_err(std::io::Error::other)
                .and_then(|line| writeln!(writer, "{line}"))
                .and_then(|()| writer.flush());
            if let Err(e) = written {
                tracing::warn!("failed to append audit entry {}: {e}", entry.id);
            }
        }
        inner.entries.push(entry.clone());
        entry
    }

    /// Up to `limit` entries, most recent first. `limit <= 0` yields none.
    pub fn get_recent_audit_logs(&self, limit: i64) -> Vec<AuditLogEntry> {
        if limit <= 0 {
            return Vec::new();
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.lock()
            .entries
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) {
        if let Some(writer) = self.lock().writer.as_mut()
            && let Err(e) = writer.flush()
        {
            tracing::warn!("failed to flush audit log: {e}");
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.flush();
    }
}

fn replay(path: &Path) -> Result<Vec<AuditLogEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("skipping audit line {} in {}: {e}", n + 1, path.display()),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_n(log: &AuditLog, n: usize) {
        for i in 0..n {
            log.log_self_audit(AuditLogEntry::new("test", format!("entry {i}")));
        }
    }

    #[test]
    fn test_recent_is_newest_first() {
        let log = AuditLog::in_memory();
        log_n(&log, 3);

        let recent = log.get_recent_audit_logs(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "entry 2");
        assert_eq!(recent[1].message, "entry 1");
    }

    #[test]
    fn test_limit_bounds() {
        let log = AuditLog::in_memory();
        assert!(log.get_recent_audit_logs(5).is_empty());

        log_n(&log, 3);
        assert!(log.get_recent_audit_logs(0).is_empty());
        assert!(log.get_recent_audit_logs(-4).is_empty());
        assert_eq!(log.get_recent_audit_logs(100).len(), 3);
        assert_eq!(log.get_recent_audit_logs(i64::MAX).len(), 3);
    }

    #[test]
    fn test_entry_on_disk_before_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.log_self_audit(AuditLogEntry::new("test", "visible"));

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 1);
        assert!(on_disk.contains("visible"));
        assert_eq!(AuditLog::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_file_replayed_on_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.log_self_audit(
                AuditLogEntry::new("reflection", "first").with_details(json!({"n": 1})),
            );
            log.log_self_audit(AuditLogEntry::new("reflection", "second"));
        }

        let log = AuditLog::open(&path).unwrap();
        let recent = log.get_recent_audit_logs(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].details, json!({"n": 1}));
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let good = serde_json::to_string(&AuditLogEntry::new("k", "ok")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n\n")).unwrap();

        let log = AuditLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let log = std::sync::Arc::new(AuditLog::in_memory());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = std::sync::Arc::clone(&log);
                std::thread::spawn(move || log_n(&log, 25))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 100);
    }
}
