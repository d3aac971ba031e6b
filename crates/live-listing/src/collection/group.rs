//! Groups and the mirror that keeps them in step with a flat collection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use super::{ConcurrentGroupedCollection, HeaderPopulator, KeySelector};
use crate::ignore_poison::{IgnorePoison, IgnorePoisonRw};

/// Display metadata of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupHeader {
    pub text: String,
    pub subtext: Option<String>,
    /// "1 item", "12 items". Maintained by the grouping mirror.
    pub count_text: String,
    /// Orders the group ahead of text comparison when set. `None` compares as 0.
    pub sort_index_override: Option<i32>,
    pub icon: Option<String>,
}

type HeaderListener = Arc<dyn Fn(&GroupHeader) + Send + Sync>;

/// A named sub-collection of items sharing a group key.
pub struct Group<T> {
    key: String,
    header: Mutex<GroupHeader>,
    items: ConcurrentGroupedCollection<T>,
    header_listeners: RwLock<Vec<HeaderListener>>,
    in_bulk: AtomicBool,
    header_dirty: AtomicBool,
}

impl<T> Group<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            header: Mutex::new(GroupHeader {
                text: key.clone(),
                ..GroupHeader::default()
            }),
            key,
            items: ConcurrentGroupedCollection::new(),
            header_listeners: RwLock::new(Vec::new()),
            in_bulk: AtomicBool::new(false),
            header_dirty: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn header(&self) -> GroupHeader {
        self.header.lock_ignore_poison().clone()
    }

    /// Edits the header. Listeners hear about it right away, or once at the end of a bulk
    /// operation.
    pub fn update_header(&self, edit: impl FnOnce(&mut GroupHeader)) {
        let snapshot = {
            let mut header = self.header.lock_ignore_poison();
            let before = header.clone();
            edit(&mut header);
            if *header == before {
                return;
            }
            header.clone()
        };
        if self.in_bulk.load(AtomicOrdering::Acquire) {
            self.header_dirty.store(true, AtomicOrdering::Release);
        } else {
            self.notify_header(&snapshot);
        }
    }

    pub fn subscribe_header(&self, listener: impl Fn(&GroupHeader) + Send + Sync + 'static) {
        self.header_listeners.write_ignore_poison().push(Arc::new(listener));
    }

    /// Members of this group. Mutating it directly bypasses the mirror of the owning collection.
    pub fn items(&self) -> &ConcurrentGroupedCollection<T> {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<T> {
        self.items.first()
    }

    pub fn begin_bulk_operation(&self) {
        self.in_bulk.store(true, AtomicOrdering::Release);
        self.items.begin_bulk_operation();
    }

    pub fn end_bulk_operation(&self) {
        self.items.end_bulk_operation();
        self.in_bulk.store(false, AtomicOrdering::Release);
        if self.header_dirty.swap(false, AtomicOrdering::AcqRel) {
            let snapshot = self.header();
            self.notify_header(&snapshot);
        }
    }

    fn refresh_count_text(&self) {
        let count = self.items.len();
        let text = if count == 1 {
            "1 item".to_string()
        } else {
            format!("{} items", count)
        };
        self.update_header(|header| header.count_text = text);
    }

    fn notify_header(&self, header: &GroupHeader) {
        let listeners: Vec<HeaderListener> = self.header_listeners.read_ignore_poison().clone();
        for listener in listeners {
            listener(header);
        }
    }
}

impl<T> PartialEq for Group<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> std::fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("header", &*self.header.lock_ignore_poison())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Grouping mirror
// ============================================================================

/// Headers filled in at commit time, by group key.
pub(crate) type DraftHeaders = HashMap<String, GroupHeader>;

/// Group membership work, computed at commit time and applied in delivery order.
pub(crate) enum MirrorOp<T> {
    /// Keyed items added and removed by one structural change. A removed item's key says where
    /// it is expected; an item whose key drifted since it was filed is found where it sits.
    Update {
        added: Vec<(String, T)>,
        removed: Vec<(String, T)>,
        headers: DraftHeaders,
    },
    Clear,
    /// Discards every group and regroups the given items.
    Rebuild {
        keyed: Vec<(String, T)>,
        headers: DraftHeaders,
    },
    BeginBulk,
    EndBulk,
}

/// Derived grouping state owned by a collection.
///
/// Kept behind a trait object so the item collection never names the concrete groups
/// collection type in its own generic code.
pub(crate) trait MembershipMirror<T>: Send + Sync {
    fn key_of(&self, item: &T) -> String;
    fn set_key_selector(&self, key_selector: KeySelector<T>);
    fn header_populator(&self) -> Option<HeaderPopulator<T>>;
    fn set_header_populator(&self, populator: Option<HeaderPopulator<T>>);
    fn groups(&self) -> Arc<ConcurrentGroupedCollection<Arc<Group<T>>>>;
    fn apply(&self, op: MirrorOp<T>);
}

/// Runs `populator` once per distinct key, on a detached group holding the first item with
/// that key. Groups created when the op is applied take these headers.
pub(crate) fn draft_headers<T>(populator: Option<&HeaderPopulator<T>>, keyed: &[(String, T)]) -> DraftHeaders
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mut headers = HashMap::new();
    let Some(populate) = populator else {
        return headers;
    };
    for (key, item) in keyed {
        if headers.contains_key(key) {
            continue;
        }
        let draft = Group::new(key.clone());
        draft.items.add(item.clone());
        populate(&draft);
        headers.insert(key.clone(), draft.header());
    }
    headers
}

pub(crate) struct GroupIndex<T> {
    key_selector: RwLock<KeySelector<T>>,
    header_populator: RwLock<Option<HeaderPopulator<T>>>,
    groups: Arc<ConcurrentGroupedCollection<Arc<Group<T>>>>,
    by_key: Mutex<HashMap<String, Arc<Group<T>>>>,
    bulk_active: AtomicBool,
}

impl<T> GroupIndex<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(key_selector: KeySelector<T>) -> Self {
        Self {
            key_selector: RwLock::new(key_selector),
            header_populator: RwLock::new(None),
            groups: Arc::new(ConcurrentGroupedCollection::new()),
            by_key: Mutex::new(HashMap::new()),
            bulk_active: AtomicBool::new(false),
        }
    }

    /// Builds a group around its first members, with the header drafted for it (if any).
    fn create_group(&self, key: String, members: Vec<T>, header: Option<GroupHeader>) -> Arc<Group<T>> {
        let group = Arc::new(Group::new(key));
        if let Some(header) = header {
            *group.header.lock_ignore_poison() = header;
        }
        if self.bulk_active.load(AtomicOrdering::Acquire) {
            group.begin_bulk_operation();
        }
        group.items.add_range(members);
        group.refresh_count_text();
        group
    }

    fn add_members(&self, added: Vec<(String, T)>, headers: &mut DraftHeaders) {
        let mut by_key = self.by_key.lock_ignore_poison();
        for (key, item) in added {
            if let Some(group) = by_key.get(&key) {
                group.items.add(item);
                group.items.set_sorted(false);
                group.refresh_count_text();
            } else {
                let header = headers.remove(&key);
                let group = self.create_group(key.clone(), vec![item], header);
                by_key.insert(key, Arc::clone(&group));
                self.groups.add(group);
                self.groups.set_sorted(false);
            }
        }
    }

    /// Takes items out of the groups they are filed in. Returns the keys of groups left empty.
    fn remove_members(&self, removed: Vec<(String, T)>) -> Vec<String> {
        let by_key = self.by_key.lock_ignore_poison();
        let mut emptied = Vec::new();
        for (key, item) in removed {
            let expected = by_key.get(&key).filter(|group| group.items.contains(&item));
            let Some(group) = expected.or_else(|| by_key.values().find(|group| group.items.contains(&item))) else {
                log::warn!("remove_members: no group holds an item keyed {:?}", key);
                continue;
            };
            if group.key() != key {
                log::debug!("remove_members: item keyed {:?} was filed under {:?}", key, group.key());
            }
            group.items.remove(&item);
            if group.is_empty() {
                emptied.push(group.key().to_string());
            } else {
                group.refresh_count_text();
            }
        }
        emptied
    }

    /// Drops the groups among `keys` that are still empty.
    fn prune(&self, keys: Vec<String>) {
        let mut by_key = self.by_key.lock_ignore_poison();
        for key in keys {
            let Some(group) = by_key.get(&key).filter(|group| group.is_empty()).cloned() else {
                continue;
            };
            by_key.remove(&key);
            self.groups.remove(&group);
        }
    }

    fn rebuild(&self, keyed: Vec<(String, T)>, mut headers: DraftHeaders) {
        let mut order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<T>> = HashMap::new();
        for (key, item) in keyed {
            members
                .entry(key)
                .or_insert_with_key(|key| {
                    order.push(key.clone());
                    Vec::new()
                })
                .push(item);
        }

        let mut by_key = self.by_key.lock_ignore_poison();
        by_key.clear();
        let mut groups = Vec::with_capacity(order.len());
        for key in order {
            let items = members.remove(&key).unwrap_or_default();
            let header = headers.remove(&key);
            let group = self.create_group(key.clone(), items, header);
            by_key.insert(key, Arc::clone(&group));
            groups.push(group);
        }
        self.groups.reset_with(groups);
        self.groups.set_sorted(false);
    }
}

impl<T> MembershipMirror<T> for GroupIndex<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn key_of(&self, item: &T) -> String {
        let key_selector = self.key_selector.read_ignore_poison().clone();
        key_selector(item)
    }

    fn set_key_selector(&self, key_selector: KeySelector<T>) {
        *self.key_selector.write_ignore_poison() = key_selector;
    }

    fn header_populator(&self) -> Option<HeaderPopulator<T>> {
        self.header_populator.read_ignore_poison().clone()
    }

    fn set_header_populator(&self, populator: Option<HeaderPopulator<T>>) {
        *self.header_populator.write_ignore_poison() = populator;
    }

    fn groups(&self) -> Arc<ConcurrentGroupedCollection<Arc<Group<T>>>> {
        Arc::clone(&self.groups)
    }

    fn apply(&self, op: MirrorOp<T>) {
        match op {
            // Removals go first so a Replace finds the old item, not the new one. Groups emptied
            // by the removal survive if the additions refill them.
            MirrorOp::Update {
                added,
                removed,
                mut headers,
            } => {
                let emptied = self.remove_members(removed);
                self.add_members(added, &mut headers);
                self.prune(emptied);
            }
            MirrorOp::Clear => {
                self.by_key.lock_ignore_poison().clear();
                self.groups.clear();
            }
            MirrorOp::Rebuild { keyed, headers } => self.rebuild(keyed, headers),
            MirrorOp::BeginBulk => {
                self.bulk_active.store(true, AtomicOrdering::Release);
                for group in self.groups.snapshot() {
                    group.begin_bulk_operation();
                }
                self.groups.begin_bulk_operation();
            }
            MirrorOp::EndBulk => {
                self.bulk_active.store(false, AtomicOrdering::Release);
                for group in self.groups.snapshot() {
                    group.end_bulk_operation();
                }
                self.groups.end_bulk_operation();
            }
        }
    }
}
