//! The entry source boundary: raw records, batched and sequential retrieval, and its errors.

use chrono::{DateTime, Utc};

use crate::listing::entry::{RecycleInfo, SyncStatus};

/// One directory entry as an entry source reports it, before filtering and classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub is_hidden: bool,
    pub is_system: bool,
    pub sync_status: Option<SyncStatus>,
    /// Present for items listed from a recycle bin.
    pub recycle: Option<RecycleInfo>,
}

impl RawRecord {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            ..Self::file(name, path)
        }
    }
}

/// Errors an entry source may raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The location vanished
    NotFound(String),
    /// Permission denied
    AccessDenied(String),
    /// The source does not support this retrieval mode
    NotImplemented,
    /// Any other I/O failure
    Io(String),
}

impl SourceError {
    /// Whether enumeration recovers from this error locally instead of giving up.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AccessDenied(_) | Self::NotImplemented)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Path not found: {}", path),
            Self::AccessDenied(path) => write!(f, "Access denied: {}", path),
            Self::NotImplemented => write!(f, "Retrieval mode not implemented by this source"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(err.to_string()),
            std::io::ErrorKind::Unsupported => Self::NotImplemented,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Produces the raw records of one location.
///
/// Calls are blocking; the enumeration pipeline runs them on tokio's blocking pool.
pub trait EntrySource: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Returns up to `count` records starting at `offset`. An empty batch means the sequence
    /// is exhausted. Offsets count raw records, filtered or not.
    fn read_batch(&self, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError>;

    /// Opens a one-at-a-time cursor positioned at the first record.
    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError>;
}

/// One-at-a-time record retrieval.
pub trait RecordCursor: Send {
    /// The next record, `Some(Err(_))` for a record that could not be read, or `None` at the end.
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>>;
}
