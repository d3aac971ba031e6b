//! Consumer-side listing session.
//!
//! A `ListingView` owns the entry collection for one open directory. It feeds producer batches
//! into the collection (one bulk operation per flush), keeps items and groups ordered by the
//! current policies, and re-applies those policies when the user re-sorts or re-groups without
//! enumerating the source again.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::collection::{ConcurrentGroupedCollection, Group};
use crate::config::ListingSettings;
use crate::enumeration::batched::list_entries;
use crate::enumeration::sequential::list_entries_from_cursor;
use crate::enumeration::source::{EntrySource, RecordCursor};
use crate::enumeration::{CancellationFlag, Completion, ListingOptions, ListingOutcome};
use crate::ignore_poison::IgnorePoison;
use crate::listing::entry::{Entry, EntryId};
use crate::listing::grouping::{GroupOption, GroupPolicy, compare_groups};
use crate::listing::sorting::{SortDirection, SortPolicy, compare_entries};

pub type Groups = Arc<ConcurrentGroupedCollection<Arc<Group<Entry>>>>;

/// Sort and group choices currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arrangement {
    sort: SortPolicy,
    group_option: GroupOption,
    group_direction: SortDirection,
}

/// State shared with in-flight flush callbacks.
struct Shared {
    entries: Arc<ConcurrentGroupedCollection<Entry>>,
    arrangement: Mutex<Arrangement>,
    group_policy: GroupPolicy,
}

pub struct ListingView {
    shared: Arc<Shared>,
    options: ListingOptions,
    cancel: Mutex<CancellationFlag>,
}

impl ListingView {
    pub fn new(settings: &ListingSettings) -> Self {
        Self::with_group_policy(settings, GroupPolicy::default())
    }

    /// A view whose group headers use the given label formatters.
    pub fn with_group_policy(settings: &ListingSettings, group_policy: GroupPolicy) -> Self {
        let view = Self {
            shared: Arc::new(Shared {
                entries: Arc::new(ConcurrentGroupedCollection::new()),
                arrangement: Mutex::new(Arrangement {
                    sort: settings.sort,
                    group_option: settings.group_option,
                    group_direction: settings.group_direction,
                }),
                group_policy,
            }),
            options: settings.listing_options(),
            cancel: Mutex::new(CancellationFlag::new()),
        };
        view.shared.install_grouping(settings.group_option);
        view
    }

    /// Replaces the listing options (visibility, batching, count limit, classifier) used by
    /// later loads.
    pub fn set_listing_options(&mut self, options: ListingOptions) {
        self.options = options;
    }

    pub fn entries(&self) -> &Arc<ConcurrentGroupedCollection<Entry>> {
        &self.shared.entries
    }

    /// The live groups collection, or `None` when grouping is off.
    pub fn groups(&self) -> Option<Groups> {
        self.shared.entries.groups()
    }

    pub fn sort_policy(&self) -> SortPolicy {
        self.shared.arrangement.lock_ignore_poison().sort
    }

    pub fn group_option(&self) -> GroupOption {
        self.shared.arrangement.lock_ignore_poison().group_option
    }

    // ========================================
    // Loading
    // ========================================

    /// Clears the view and lists `source` into it, cancelling any load still in flight.
    ///
    /// Every intermediate flush is merged as one bulk operation, so observers see one Reset per
    /// flush. A cancelled load merges nothing further.
    pub async fn load(&self, source: Arc<dyn EntrySource>) -> Completion {
        let cancel = self.restart();
        let mut flush = self.shared.flush_callback(cancel.clone());
        let outcome = list_entries(source, &cancel, &self.options, Some(&mut flush)).await;
        self.shared.finish_load(outcome, &cancel)
    }

    /// Like [`load`](Self::load), reading one record at a time from `cursor`.
    pub async fn load_from_cursor(&self, cursor: Box<dyn RecordCursor>) -> Completion {
        let cancel = self.restart();
        let mut flush = self.shared.flush_callback(cancel.clone());
        let outcome = list_entries_from_cursor(cursor, &cancel, &self.options, Some(&mut flush)).await;
        self.shared.finish_load(outcome, &cancel)
    }

    /// Cancels the current load. Entries already merged stay.
    pub fn cancel(&self) {
        self.cancel.lock_ignore_poison().cancel();
    }

    /// Cancels the previous load, empties the collection and hands out a fresh flag.
    fn restart(&self) -> CancellationFlag {
        let fresh = CancellationFlag::new();
        let previous = std::mem::replace(&mut *self.cancel.lock_ignore_poison(), fresh.clone());
        previous.cancel();
        self.shared.entries.clear();
        fresh
    }

    // ========================================
    // Re-arranging
    // ========================================

    /// Re-sorts the items and every group's items with `sort`.
    pub fn set_sort_policy(&self, sort: SortPolicy) {
        let arrangement = {
            let mut arrangement = self.shared.arrangement.lock_ignore_poison();
            arrangement.sort = sort;
            *arrangement
        };
        let entries = &self.shared.entries;
        entries.begin_bulk_operation();
        entries.order(|a, b| compare_entries(a, b, &arrangement.sort));
        if let Some(groups) = entries.groups() {
            for group in groups.iter() {
                group.items().order(|a, b| compare_entries(a, b, &arrangement.sort));
            }
        }
        entries.end_bulk_operation();
    }

    /// Regroups every entry by `option`, ordering groups in `direction`. Installing the new
    /// key selector and header populator resets the groups in one pass.
    pub fn set_group_option(&self, option: GroupOption, direction: SortDirection) {
        {
            let mut arrangement = self.shared.arrangement.lock_ignore_poison();
            arrangement.group_option = option;
            arrangement.group_direction = direction;
        }
        let entries = &self.shared.entries;
        entries.begin_bulk_operation();
        self.shared.install_grouping(option);
        self.shared.order_groups();
        entries.end_bulk_operation();
    }

    /// Sorts the groups that have gone unsorted, then the groups collection if it has.
    pub fn order_groups(&self) {
        self.shared.order_groups();
    }

    /// Applies `update` to the entry with `id` and moves it to its sorted position, in the
    /// flat collection and in its group. Returns false if no such entry is listed.
    pub fn update_entry(&self, id: EntryId, update: impl FnOnce(&mut Entry)) -> bool {
        let entries = &self.shared.entries;
        if !entries.update_where(|entry| entry.id() == id, update) {
            return false;
        }
        let Some(updated) = entries.find(|entry| entry.id() == id) else {
            return false;
        };
        let sort = self.sort_policy();
        entries.order_one(|a, b| compare_entries(a, b, &sort), &updated);
        if let Some(groups) = entries.groups()
            && let Some(group) = groups.iter().find(|group| group.items().contains(&updated))
        {
            group.items().order_one(|a, b| compare_entries(a, b, &sort), &updated);
        }
        self.shared.order_groups();
        true
    }

    /// Cancels loading, empties the collection and tears grouping down.
    pub fn close(&self) {
        self.cancel();
        self.shared.entries.clear();
        self.shared.entries.set_grouping(None);
        log::debug!("close: listing view closed");
    }
}

impl Drop for ListingView {
    fn drop(&mut self) {
        self.cancel.lock_ignore_poison().cancel();
    }
}

impl Shared {
    /// Installs the key selector and header populator for `option`, or tears grouping down.
    fn install_grouping(&self, option: GroupOption) {
        match self.group_policy.for_option(option) {
            Some((key_selector, populator)) => self.entries.set_grouping_with_headers(key_selector, populator),
            None => self.entries.set_grouping(None),
        }
    }

    fn flush_callback(
        self: &Arc<Self>,
        cancel: CancellationFlag,
    ) -> impl FnMut(Vec<Entry>) -> BoxFuture<'static, ()> + Send + 'static {
        let shared = Arc::clone(self);
        move |batch: Vec<Entry>| -> BoxFuture<'static, ()> {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            Box::pin(async move {
                if !cancel.is_cancelled() {
                    shared.merge(batch);
                }
            })
        }
    }

    fn finish_load(&self, outcome: ListingOutcome, cancel: &CancellationFlag) -> Completion {
        if !cancel.is_cancelled() && !outcome.entries.is_empty() {
            self.merge(outcome.entries);
        }
        log::debug!(
            "finish_load: completion={:?}, listed={}",
            outcome.completion,
            self.entries.len()
        );
        outcome.completion
    }

    /// Adds a batch, re-orders items and groups, and notifies once.
    fn merge(&self, batch: Vec<Entry>) {
        let sort = self.arrangement.lock_ignore_poison().sort;
        self.entries.begin_bulk_operation();
        self.entries.add_range(batch);
        self.entries.order(|a, b| compare_entries(a, b, &sort));
        self.order_groups();
        self.entries.end_bulk_operation();
    }

    fn order_groups(&self) {
        let Some(groups) = self.entries.groups() else {
            return;
        };
        let arrangement = *self.arrangement.lock_ignore_poison();
        for group in groups.iter() {
            if !group.items().is_sorted() {
                group.items().order(|a, b| compare_entries(a, b, &arrangement.sort));
            }
        }
        if groups.is_sorted() {
            return;
        }

        // Headers and first members are read here, before the groups lock is taken.
        let mut ranked = groups.snapshot();
        ranked.sort_by(|a, b| compare_groups(a, b, arrangement.group_option, arrangement.group_direction));
        let rank: HashMap<String, usize> = ranked
            .iter()
            .enumerate()
            .map(|(index, group)| (group.key().to_string(), index))
            .collect();
        let position = |group: &Arc<Group<Entry>>| rank.get(group.key()).copied().unwrap_or(usize::MAX);
        groups.order(|a, b| position(a).cmp(&position(b)));
    }
}
