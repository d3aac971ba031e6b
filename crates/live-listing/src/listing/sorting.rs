//! Sort policy: comparators over entries, driven by option, direction and folder precedence.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::listing::entry::Entry;

// ============================================================================
// Sorting configuration
// ============================================================================

/// Attribute to sort entries by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SortOption {
    #[default]
    Name,
    DateModified,
    DateCreated,
    Size,
    FileType,
    SyncStatus,
    Tag,
    OriginalLocation,
    DateRemoved,
    Path,
}

/// Sort direction (ascending or descending).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Whether folders and files are partitioned before the primary comparator runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DirectoryPrecedence {
    FoldersFirst,
    FilesFirst,
    /// No partition: the primary comparator alone decides, also between a file and a folder.
    Alongside,
}

/// Complete sort configuration of a view.
///
/// `directories_alongside_files` and `files_first` are kept as two independent toggles.
/// When both are set, alongside wins: there is no partition to put files first in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SortPolicy {
    pub option: SortOption,
    pub direction: SortDirection,
    #[serde(alias = "directories_alongside_files")]
    pub directories_alongside_files: bool,
    #[serde(alias = "files_first")]
    pub files_first: bool,
}

impl SortPolicy {
    pub fn new(option: SortOption, direction: SortDirection) -> Self {
        Self {
            option,
            direction,
            ..Self::default()
        }
    }

    pub fn precedence(&self) -> DirectoryPrecedence {
        if self.directories_alongside_files {
            DirectoryPrecedence::Alongside
        } else if self.files_first {
            DirectoryPrecedence::FilesFirst
        } else {
            DirectoryPrecedence::FoldersFirst
        }
    }
}

// ============================================================================
// Sorting logic
// ============================================================================

/// Compares two strings using natural (alphanumeric) sort, case-insensitive.
/// Digit runs compare by value, so "file2" sorts before "file10".
pub fn compare_names_natural(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(a.to_lowercase(), b.to_lowercase())
}

/// Total order over entries for the given policy.
///
/// Folder precedence (unless `Alongside`) holds in both directions. Ties of the primary
/// comparator are broken by natural name order, which follows the direction.
pub fn compare_entries(a: &Entry, b: &Entry, policy: &SortPolicy) -> Ordering {
    match policy.precedence() {
        DirectoryPrecedence::FoldersFirst => match (a.is_folder_like(), b.is_folder_like()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        },
        DirectoryPrecedence::FilesFirst => match (a.is_folder_like(), b.is_folder_like()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        },
        DirectoryPrecedence::Alongside => {}
    }

    let primary = compare_primary(a, b, policy.option, policy.direction);
    if primary != Ordering::Equal || policy.option == SortOption::Name {
        return primary;
    }

    policy
        .direction
        .apply(compare_names_natural(a.sort_name(), b.sort_name()))
}

/// Compares by the active sort option, with the direction already applied.
/// Missing values compare as the lowest value.
fn compare_primary(a: &Entry, b: &Entry, option: SortOption, direction: SortDirection) -> Ordering {
    let ascending = match option {
        SortOption::Name => compare_names_natural(a.sort_name(), b.sort_name()),
        SortOption::DateModified => a.modified_at.cmp(&b.modified_at),
        SortOption::DateCreated => a.created_at.cmp(&b.created_at),
        SortOption::Size => a.size.cmp(&b.size),
        SortOption::FileType => compare_names_natural(&a.file_type, &b.file_type),
        SortOption::SyncStatus => a.sync_status.cmp(&b.sync_status),
        SortOption::Tag => {
            // Untagged entries stay together ahead of tagged ones in both directions
            return match (a.tag.as_deref(), b.tag.as_deref()) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a_tag), Some(b_tag)) => direction.apply(compare_names_natural(a_tag, b_tag)),
            };
        }
        SortOption::OriginalLocation => compare_names_natural(original_location(a), original_location(b)),
        SortOption::DateRemoved => deleted_at(a).cmp(&deleted_at(b)),
        SortOption::Path => compare_names_natural(a.path(), b.path()),
    };
    direction.apply(ascending)
}

fn original_location(entry: &Entry) -> &str {
    entry.recycle.as_ref().map_or("", |r| r.original_location.as_str())
}

fn deleted_at(entry: &Entry) -> Option<chrono::DateTime<chrono::Utc>> {
    entry.recycle.as_ref().and_then(|r| r.deleted_at)
}

/// Sorts entries in place. The sort is stable, so sorting a sorted slice is a no-op.
pub fn sort_entries(entries: &mut [Entry], policy: &SortPolicy) {
    entries.sort_by(|a, b| compare_entries(a, b, policy));
}
