//! The listed-item record: one file, folder, symlink or synthetic item.
//!
//! Identity (`id`, `name`, `path`, `kind`) is fixed at construction and only exposed through
//! getters. Size, timestamps and the other attribute fields are public because background
//! refreshers update them in place; such updates go through the collection (see
//! `ConcurrentGroupedCollection::update_where`) so group membership follows along.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable opaque key of an entry. Equality and hashing of [`Entry`] use only this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Items that are listed like files or folders but are not plain filesystem objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyntheticKind {
    /// An item inside the trash, carrying its original location and deletion date.
    RecycleBinItem,
    /// A library definition that aggregates several folders.
    Library,
    /// A named data stream attached to another file.
    AlternateDataStream,
    /// A link/shortcut file pointing elsewhere.
    Shortcut,
    /// A compressed archive that can be browsed like a folder.
    Archive,
}

/// What kind of object an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
    SymlinkToFile,
    SymlinkToDirectory,
    Synthetic(SyntheticKind),
}

impl EntryKind {
    /// Whether this kind lists as a folder for directory/file precedence and grouping.
    ///
    /// Archives and shortcuts open like folders but sort and group with files.
    pub fn is_folder_like(self) -> bool {
        match self {
            EntryKind::Directory | EntryKind::SymlinkToDirectory => true,
            EntryKind::Synthetic(SyntheticKind::Library) => true,
            EntryKind::File | EntryKind::SymlinkToFile => false,
            EntryKind::Synthetic(
                SyntheticKind::RecycleBinItem
                | SyntheticKind::AlternateDataStream
                | SyntheticKind::Shortcut
                | SyntheticKind::Archive,
            ) => false,
        }
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, EntryKind::SymlinkToFile | EntryKind::SymlinkToDirectory)
    }
}

/// Cloud sync state of an entry, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    NotSynced,
    Synced,
    Syncing,
    OnlineOnly,
    Offline,
    Error,
}

impl SyncStatus {
    pub fn label(self) -> &'static str {
        match self {
            SyncStatus::NotSynced => "Not synced",
            SyncStatus::Synced => "Available on this device",
            SyncStatus::Syncing => "Sync pending",
            SyncStatus::OnlineOnly => "Available when online",
            SyncStatus::Offline => "Always available on this device",
            SyncStatus::Error => "Sync error",
        }
    }
}

/// Trash metadata of a recycle-bin item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleInfo {
    /// Folder the item was deleted from.
    pub original_location: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One listed filesystem object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    id: EntryId,
    name: String,
    path: String,
    kind: EntryKind,
    /// Bytes. `None` for folders until a size has been computed.
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub is_hidden: bool,
    /// Human-readable type, like "Folder" or "TXT File".
    pub file_type: String,
    /// Lowercase extension including the dot, like ".txt".
    pub extension: Option<String>,
    pub sync_status: Option<SyncStatus>,
    pub tag: Option<String>,
    pub recycle: Option<RecycleInfo>,
    /// Externally assigned key that replaces the name in name ordering.
    pub sort_key: Option<String>,
}

impl Entry {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        let name = name.into();
        let extension = if kind.is_folder_like() { None } else { extension_of(&name) };
        let file_type = describe_type(kind, extension.as_deref());
        Self {
            id: EntryId::new(),
            name,
            path: path.into(),
            kind,
            size: None,
            modified_at: None,
            created_at: None,
            accessed_at: None,
            is_hidden: false,
            file_type,
            extension,
            sync_status: None,
            tag: None,
            recycle: None,
            sort_key: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_folder_like(&self) -> bool {
        self.kind.is_folder_like()
    }

    /// The string name ordering and name tie-breaks compare.
    pub fn sort_name(&self) -> &str {
        self.sort_key.as_deref().unwrap_or(&self.name)
    }

    /// Path of the folder containing this entry, or an empty string at a root.
    pub fn parent_path(&self) -> &str {
        let trimmed = self.path.trim_end_matches(['/', '\\']);
        match trimmed.rfind(['/', '\\']) {
            Some(0) => &trimmed[..1],
            Some(pos) => &trimmed[..pos],
            None => "",
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }

    pub fn with_created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_recycle(mut self, info: RecycleInfo) -> Self {
        self.recycle = Some(info);
        self
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entry {}

impl std::hash::Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Extracts the lowercase extension (with leading dot) of a file name.
/// Dotfiles without a second dot (like ".gitignore") have no extension.
pub(crate) fn extension_of(name: &str) -> Option<String> {
    let dot_pos = name.rfind('.')?;
    if dot_pos == 0 || dot_pos == name.len() - 1 {
        return None;
    }
    Some(name[dot_pos..].to_lowercase())
}

fn describe_type(kind: EntryKind, extension: Option<&str>) -> String {
    match kind {
        EntryKind::Directory | EntryKind::SymlinkToDirectory => "Folder".to_string(),
        EntryKind::Synthetic(SyntheticKind::Library) => "Library".to_string(),
        EntryKind::Synthetic(SyntheticKind::Shortcut) => "Shortcut".to_string(),
        EntryKind::File
        | EntryKind::SymlinkToFile
        | EntryKind::Synthetic(
            SyntheticKind::RecycleBinItem | SyntheticKind::AlternateDataStream | SyntheticKind::Archive,
        ) => match extension {
            Some(ext) => format!("{} File", ext.trim_start_matches('.').to_uppercase()),
            None => "File".to_string(),
        },
    }
}
