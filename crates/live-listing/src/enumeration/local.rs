//! Local filesystem entry source backed by `std::fs::read_dir`.
//!
//! `read_dir` has no offset-based access, so batched reads report `NotImplemented` and the
//! pipeline reads through the sequential cursor instead.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::source::{EntrySource, RawRecord, RecordCursor, SourceError};

/// Lists one local directory.
#[derive(Debug, Clone)]
pub struct LocalDirectorySource {
    path: PathBuf,
}

impl LocalDirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntrySource for LocalDirectorySource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_batch(&self, _offset: usize, _count: usize) -> Result<Vec<RawRecord>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError> {
        let entries = fs::read_dir(&self.path)?;
        Ok(Box::new(LocalCursor { entries }))
    }
}

struct LocalCursor {
    entries: fs::ReadDir,
}

impl RecordCursor for LocalCursor {
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>> {
        let entry = match self.entries.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(process_dir_entry(&entry).unwrap_or_else(|| minimal_record(&entry))))
    }
}

/// Reads one directory entry with its metadata. `None` if the metadata can't be read.
fn process_dir_entry(entry: &fs::DirEntry) -> Option<RawRecord> {
    let file_type = entry.file_type().ok()?;
    let is_symlink = file_type.is_symlink();

    let target_is_dir = is_symlink && fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);

    let metadata = if is_symlink {
        fs::symlink_metadata(entry.path()).ok()?
    } else {
        entry.metadata().ok()?
    };

    let (is_hidden, is_system) = attribute_flags(&metadata);

    Some(RawRecord {
        name: entry.file_name().to_string_lossy().to_string(),
        path: entry.path().to_string_lossy().to_string(),
        is_directory: metadata.is_dir() || target_is_dir,
        is_symlink,
        size: if metadata.is_file() { Some(metadata.len()) } else { None },
        modified_at: to_utc(metadata.modified()),
        created_at: to_utc(metadata.created()),
        accessed_at: to_utc(metadata.accessed()),
        is_hidden,
        is_system,
        sync_status: None,
        recycle: None,
    })
}

/// Permission denied or broken symlink: name and path only.
fn minimal_record(entry: &fs::DirEntry) -> RawRecord {
    RawRecord {
        is_symlink: entry.file_type().map(|ft| ft.is_symlink()).unwrap_or(false),
        ..RawRecord::file(
            entry.file_name().to_string_lossy().to_string(),
            entry.path().to_string_lossy().to_string(),
        )
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[cfg(windows)]
fn attribute_flags(metadata: &fs::Metadata) -> (bool, bool) {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    let attributes = metadata.file_attributes();
    (
        attributes & FILE_ATTRIBUTE_HIDDEN != 0,
        attributes & FILE_ATTRIBUTE_SYSTEM != 0,
    )
}

/// Unix has no hidden attribute; dotfiles are handled by the visibility policy.
#[cfg(not(windows))]
fn attribute_flags(_metadata: &fs::Metadata) -> (bool, bool) {
    (false, false)
}
