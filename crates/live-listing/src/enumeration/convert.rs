//! Record filtering and conversion: visibility flags, kind classification, and `Entry` construction.

use serde::{Deserialize, Serialize};

use super::source::RawRecord;
use crate::listing::entry::{Entry, EntryKind, SyntheticKind, extension_of};

/// Which records are listed at all. Consulted per record, before batching and count limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VisibilityPolicy {
    #[serde(alias = "show_hidden")]
    pub show_hidden: bool,
    /// Only matters for hidden records: system files are listed when hidden ones are.
    #[serde(alias = "show_system")]
    pub show_system: bool,
    #[serde(alias = "show_dot_files")]
    pub show_dot_files: bool,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            show_hidden: false,
            show_system: false,
            show_dot_files: true,
        }
    }
}

impl VisibilityPolicy {
    pub fn accepts(&self, record: &RawRecord) -> bool {
        if is_dot_directory(&record.name) {
            return false;
        }
        let hidden_ok = !record.is_hidden || (self.show_hidden && (!record.is_system || self.show_system));
        let dot_ok = !record.name.starts_with('.') || self.show_dot_files;
        hidden_ok && dot_ok
    }
}

/// The self and parent pseudo-entries some sources report.
pub(crate) fn is_dot_directory(name: &str) -> bool {
    name == "." || name == ".."
}

/// Decides which entry kind a record becomes. Must be side-effect free.
pub trait EntryClassifier: Send + Sync {
    fn classify(&self, record: &RawRecord) -> EntryKind;
}

/// Classifies by record flags and file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionClassifier;

const SHORTCUT_EXTENSIONS: &[&str] = &[".lnk", ".url"];
const LIBRARY_EXTENSIONS: &[&str] = &[".library-ms"];
const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".7z", ".rar", ".tar", ".gz"];

impl EntryClassifier for ExtensionClassifier {
    fn classify(&self, record: &RawRecord) -> EntryKind {
        if record.recycle.is_some() {
            return EntryKind::Synthetic(SyntheticKind::RecycleBinItem);
        }
        match (record.is_directory, record.is_symlink) {
            (true, true) => return EntryKind::SymlinkToDirectory,
            (true, false) => return EntryKind::Directory,
            (false, true) => return EntryKind::SymlinkToFile,
            (false, false) => {}
        }
        let Some(extension) = extension_of(&record.name) else {
            return EntryKind::File;
        };
        let extension = extension.as_str();
        if SHORTCUT_EXTENSIONS.contains(&extension) {
            EntryKind::Synthetic(SyntheticKind::Shortcut)
        } else if LIBRARY_EXTENSIONS.contains(&extension) {
            EntryKind::Synthetic(SyntheticKind::Library)
        } else if ARCHIVE_EXTENSIONS.contains(&extension) {
            EntryKind::Synthetic(SyntheticKind::Archive)
        } else {
            EntryKind::File
        }
    }
}

/// Builds the entry for an accepted record.
pub fn convert_record(record: RawRecord, classifier: &dyn EntryClassifier) -> Entry {
    let kind = classifier.classify(&record);
    let mut entry = Entry::new(record.name, record.path, kind);
    entry.size = match kind {
        EntryKind::Directory | EntryKind::SymlinkToDirectory => None,
        _ => record.size,
    };
    entry.modified_at = record.modified_at;
    entry.created_at = record.created_at;
    entry.accessed_at = record.accessed_at;
    entry.is_hidden = record.is_hidden;
    entry.sync_status = record.sync_status;
    entry.recycle = record.recycle;
    entry
}
