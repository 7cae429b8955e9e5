use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    /// The backing medium could not be opened or read.
    StorageUnavailable(String),
    /// A single record could not be parsed.
    CorruptData { id: String, reason: String },
    TraceNotFound(String),
    DuplicateTraceId(String),
    UnknownTarget(String),
    MutationCycleInProgress(String),
    InvalidData(String),
    LockPoisoned,
}

impl StoreError {
    /// Taxonomy name reported to callers. Backend failures collapse
    /// into `StorageUnavailable`.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Sqlite(_)
            | StoreError::Io(_)
            | StoreError::StorageUnavailable(_)
            | StoreError::LockPoisoned => "StorageUnavailable",
            StoreError::CorruptData { .. } => "CorruptData",
            StoreError::TraceNotFound(_) => "TraceNotFound",
            StoreError::DuplicateTraceId(_) => "DuplicateTraceId",
            StoreError::UnknownTarget(_) => "UnknownTarget",
            StoreError::MutationCycleInProgress(_) => "MutationCycleInProgress",
            StoreError::InvalidData(_) => "InvalidData",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TraceNotFound(_) | StoreError::UnknownTarget(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::StorageUnavailable(msg) => write!(f, "storage unavailable: {msg}"),
            StoreError::CorruptData { id, reason } => {
                write!(f, "corrupt record '{id}': {reason}")
            }
            StoreError::TraceNotFound(id) => write!(f, "trace not found: {id}"),
            StoreError::DuplicateTraceId(id) => write!(f, "trace already exists: {id}"),
            StoreError::UnknownTarget(id) => write!(f, "unknown target: {id}"),
            StoreError::MutationCycleInProgress(id) => {
                write!(f, "mutation cycle already in progress for trace: {id}")
            }
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::LockPoisoned => write!(f, "store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(format!("JSON: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
