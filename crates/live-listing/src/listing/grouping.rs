//! Group policy: which group an entry belongs to, how group headers read, and how groups order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::collection::{Group, HeaderPopulator, KeySelector};
use crate::listing::entry::{Entry, SyncStatus};
use crate::listing::labels::{DateLabeler, RelativeDateLabeler, SizeLabeler, SizeLadder};
use crate::listing::sorting::{SortDirection, compare_names_natural};

/// Attribute to group entries by. `None` turns grouping off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum GroupOption {
    #[default]
    None,
    Name,
    Size,
    DateModified,
    DateCreated,
    FileType,
    SyncStatus,
    Tag,
    OriginalLocation,
    DateRemoved,
    ParentFolder,
}

const FOLDERS_KEY: &str = "Folders";
const UNTAGGED_KEY: &str = "Untagged";
const UNKNOWN_KEY: &str = "Unknown";

/// Builds key selectors and header populators for entries, using injected label formatters.
#[derive(Clone)]
pub struct GroupPolicy {
    dates: Arc<dyn DateLabeler>,
    sizes: Arc<dyn SizeLabeler>,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self::new(Arc::new(RelativeDateLabeler::new()), Arc::new(SizeLadder))
    }
}

impl GroupPolicy {
    pub fn new(dates: Arc<dyn DateLabeler>, sizes: Arc<dyn SizeLabeler>) -> Self {
        Self { dates, sizes }
    }

    /// Key selector and header populator for `option`, or `None` when grouping is off.
    pub fn for_option(&self, option: GroupOption) -> Option<(KeySelector<Entry>, HeaderPopulator<Entry>)> {
        if option == GroupOption::None {
            return None;
        }
        let keys = self.clone();
        let key_selector: KeySelector<Entry> = Arc::new(move |entry: &Entry| keys.key_for(option, entry));
        let headers = self.clone();
        let populator: HeaderPopulator<Entry> = Arc::new(move |group: &Group<Entry>| headers.populate(option, group));
        Some((key_selector, populator))
    }

    /// The group key of `entry` under `option`. Empty for [`GroupOption::None`].
    pub fn key_for(&self, option: GroupOption, entry: &Entry) -> String {
        match option {
            GroupOption::None => String::new(),
            GroupOption::Name => entry.name().chars().next().map(|c| c.to_uppercase().collect::<String>()).unwrap_or_default(),
            GroupOption::Size => {
                if entry.is_folder_like() {
                    FOLDERS_KEY.to_string()
                } else {
                    self.sizes.bucket(entry.size.unwrap_or(0)).label
                }
            }
            GroupOption::DateModified => self.dates.bucket(entry.modified_at).label,
            GroupOption::DateCreated => self.dates.bucket(entry.created_at).label,
            GroupOption::DateRemoved => self.dates.bucket(deleted_at(entry)).label,
            GroupOption::FileType => entry.file_type.clone(),
            GroupOption::SyncStatus => entry.sync_status.map_or(UNKNOWN_KEY, SyncStatus::label).to_string(),
            GroupOption::Tag => entry.tag.clone().unwrap_or_else(|| UNTAGGED_KEY.to_string()),
            GroupOption::OriginalLocation => entry
                .recycle
                .as_ref()
                .map(|r| r.original_location.clone())
                .unwrap_or_default(),
            GroupOption::ParentFolder => entry.parent_path().to_string(),
        }
    }

    /// Fills a new group's header from its first member.
    fn populate(&self, option: GroupOption, group: &Group<Entry>) {
        let Some(first) = group.first() else {
            return;
        };
        match option {
            GroupOption::None | GroupOption::Name => {}
            GroupOption::Size => {
                if first.is_folder_like() {
                    group.update_header(|h| h.icon = Some("folder".to_string()));
                } else {
                    let bucket = self.sizes.bucket(first.size.unwrap_or(0));
                    group.update_header(|h| {
                        h.text = bucket.label;
                        h.subtext = bucket.subtext;
                        h.sort_index_override = Some(bucket.sort_index);
                    });
                }
            }
            GroupOption::DateModified | GroupOption::DateCreated | GroupOption::DateRemoved => {
                let at = match option {
                    GroupOption::DateModified => first.modified_at,
                    GroupOption::DateCreated => first.created_at,
                    _ => deleted_at(&first),
                };
                let bucket = self.dates.bucket(at);
                group.update_header(|h| {
                    h.text = bucket.label;
                    h.subtext = bucket.subtext;
                    h.sort_index_override = Some(bucket.sort_index);
                });
            }
            GroupOption::FileType => {
                // Folder-like groups list before every file type
                let rank = if first.is_folder_like() { 1 } else { 2 };
                group.update_header(|h| {
                    h.sort_index_override = Some(rank);
                    h.icon = first.extension.clone();
                });
            }
            GroupOption::SyncStatus => {
                let rank = first.sync_status.map_or(-1, |s| s as i32);
                group.update_header(|h| h.sort_index_override = Some(rank));
            }
            GroupOption::Tag => {
                if first.tag.is_none() {
                    group.update_header(|h| h.sort_index_override = Some(-1));
                }
            }
            GroupOption::OriginalLocation => {
                if group.key().is_empty() {
                    group.update_header(|h| h.text = UNKNOWN_KEY.to_string());
                }
            }
            GroupOption::ParentFolder => {
                let parent = first.parent_path().to_string();
                let text = parent
                    .trim_end_matches(['/', '\\'])
                    .rsplit(['/', '\\'])
                    .next()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(&parent)
                    .to_string();
                group.update_header(|h| {
                    h.text = text;
                    h.subtext = Some(parent.clone());
                });
            }
        }
    }
}

fn deleted_at(entry: &Entry) -> Option<chrono::DateTime<chrono::Utc>> {
    entry.recycle.as_ref().and_then(|r| r.deleted_at)
}

/// Display order of two groups.
///
/// Groups order by sort-index override, then header text, both in `direction`. Under size
/// grouping, groups of folders come before groups of files in either direction.
pub fn compare_groups(a: &Group<Entry>, b: &Group<Entry>, option: GroupOption, direction: SortDirection) -> Ordering {
    if option == GroupOption::Size {
        let holds_files = |g: &Group<Entry>| !g.first().is_some_and(|e| e.is_folder_like());
        let partition = holds_files(a).cmp(&holds_files(b));
        if partition != Ordering::Equal {
            return partition;
        }
    }

    let (a_header, b_header) = (a.header(), b.header());
    let by_index = a_header
        .sort_index_override
        .unwrap_or(0)
        .cmp(&b_header.sort_index_override.unwrap_or(0));
    let ordering = by_index.then_with(|| compare_names_natural(&a_header.text, &b_header.text));
    direction.apply(ordering)
}
