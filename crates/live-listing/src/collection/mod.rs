//! Thread-safe, observable, optionally grouped sequence.
//!
//! `ConcurrentGroupedCollection<T>` is an ordered `Vec<T>` behind a single mutex. Every
//! structural mutation runs in two phases:
//!
//! 1. **Commit**, under the mutex: group keys are computed, the backing sequence is changed and
//!    a delivery ticket is taken. Keys and orderings are computed before anything is touched,
//!    so a panicking key selector or comparator leaves the collection as it was.
//! 2. **Delivery**, outside the mutex but strictly in ticket order: the grouping mirror is
//!    updated, then observers are told. An observer therefore never sees the groups lag behind
//!    the change it is handling, and it can read the collection freely.
//!
//! Observers must not mutate the collection they are observing from inside a notification:
//! the nested mutation waits for a ticket that the running delivery holds, and deadlocks.
//!
//! Between `begin_bulk_operation` and the matching `end_bulk_operation` nothing is delivered to
//! observers; the end emits a single `Reset`. Bulk state is propagated to every group.

pub mod change;
pub mod group;


use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::ignore_poison::{IgnorePoison, IgnorePoisonRw};
pub use change::{ChangeKind, CollectionChange};
use group::{GroupIndex, MembershipMirror, MirrorOp, draft_headers};
pub use group::{Group, GroupHeader};

/// Maps an item to the key of the group it belongs to.
pub type KeySelector<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Fills a freshly created group's header from its members.
pub type HeaderPopulator<T> = Arc<dyn Fn(&Group<T>) + Send + Sync>;

/// Receives every delivered change.
pub type Listener<T> = Arc<dyn Fn(&CollectionChange<T>) + Send + Sync>;

/// Handle returned by [`ConcurrentGroupedCollection::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct State<T> {
    items: Vec<T>,
    bulk_depth: usize,
    mirror: Option<Arc<dyn MembershipMirror<T>>>,
    next_ticket: u64,
}

/// Work left over from a commit, delivered in ticket order.
struct Pending<T> {
    ticket: u64,
    mirror_op: Option<(Arc<dyn MembershipMirror<T>>, MirrorOp<T>)>,
    /// `None` while a bulk operation suppresses notifications.
    change: Option<CollectionChange<T>>,
}

/// Hands out delivery turns in ticket order.
#[derive(Default)]
struct Sequencer {
    delivered: Mutex<u64>,
    turn: Condvar,
}

impl Sequencer {
    fn wait_for(&self, ticket: u64) -> Turn<'_> {
        let mut delivered = self.delivered.lock_ignore_poison();
        while *delivered != ticket {
            delivered = self.turn.wait(delivered).unwrap_or_else(|e| e.into_inner());
        }
        Turn { sequencer: self }
    }
}

/// Passes the turn on when dropped, also when a listener panics.
struct Turn<'a> {
    sequencer: &'a Sequencer,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut delivered = self.sequencer.delivered.lock_ignore_poison();
        *delivered += 1;
        self.sequencer.turn.notify_all();
    }
}

pub struct ConcurrentGroupedCollection<T> {
    state: Mutex<State<T>>,
    sequencer: Sequencer,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
    next_subscription: AtomicU64,
    is_sorted: AtomicBool,
}

impl<T> Default for ConcurrentGroupedCollection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentGroupedCollection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                bulk_depth: 0,
                mirror: None,
                next_ticket: 0,
            }),
            sequencer: Sequencer::default(),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            is_sorted: AtomicBool::new(false),
        }
    }

    pub fn with_items(items: Vec<T>) -> Self {
        let collection = Self::new();
        collection.add_range(items);
        collection
    }

    // ========================================
    // Reading
    // ========================================

    pub fn len(&self) -> usize {
        self.state.lock_ignore_poison().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock_ignore_poison().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.state.lock_ignore_poison().items.get(index).cloned()
    }

    pub fn first(&self) -> Option<T> {
        self.get(0)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.state.lock_ignore_poison().items.iter().position(|x| x == item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// First item matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.state.lock_ignore_poison().items.iter().find(|x| predicate(x)).cloned()
    }

    /// Private copy of the contents, taken under the write lock.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock_ignore_poison().items.clone()
    }

    /// Iterates over a snapshot; concurrent writers never tear or invalidate it.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.snapshot().into_iter()
    }

    pub fn is_in_bulk(&self) -> bool {
        self.state.lock_ignore_poison().bulk_depth > 0
    }

    /// Whether the consumer has ordered this collection since the grouping mirror last
    /// appended to it.
    pub fn is_sorted(&self) -> bool {
        self.is_sorted.load(AtomicOrdering::Acquire)
    }

    pub fn set_sorted(&self, sorted: bool) {
        self.is_sorted.store(sorted, AtomicOrdering::Release);
    }

    // ========================================
    // Observers
    // ========================================

    pub fn subscribe(&self, listener: impl Fn(&CollectionChange<T>) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, AtomicOrdering::Relaxed));
        let listener: Listener<T> = Arc::new(listener);
        self.listeners.write_ignore_poison().push((id, listener));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write_ignore_poison();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers every change into a channel. The subscription lives as long as the collection;
    /// sends into a dropped receiver are ignored.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<CollectionChange<T>> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        self.subscribe(move |change| {
            let _ = tx.lock_ignore_poison().send(change.clone());
        });
        rx
    }

    // ========================================
    // Single-item mutations
    // ========================================

    pub fn add(&self, item: T) {
        self.add_range(vec![item]);
    }

    /// Inserts at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, item: T) {
        self.insert_range(index, vec![item]);
    }

    /// Removes the first item equal to `item`. Returns false if there was none.
    pub fn remove(&self, item: &T) -> bool {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let Some(index) = state.items.iter().position(|x| x == item) else {
                return false;
            };
            let removed = vec![state.items[index].clone()];
            let op = plan_update(state.mirror.as_ref(), &[], &removed);
            state.items.remove(index);
            commit(&mut state, CollectionChange::removed(removed, index), op)
        };
        self.deliver(pending);
        true
    }

    /// Removes and returns the item at `index`, or `None` if out of range.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        let (pending, item) = {
            let mut state = self.state.lock_ignore_poison();
            let item = state.items.get(index)?.clone();
            let op = plan_update(state.mirror.as_ref(), &[], std::slice::from_ref(&item));
            state.items.remove(index);
            (
                commit(&mut state, CollectionChange::removed(vec![item.clone()], index), op),
                item,
            )
        };
        self.deliver(pending);
        Some(item)
    }

    /// Replaces the item at `index`, returning the previous one, or `None` if out of range.
    pub fn set(&self, index: usize, item: T) -> Option<T> {
        let (pending, old) = {
            let mut state = self.state.lock_ignore_poison();
            let old = state.items.get(index)?.clone();
            let op = plan_update(
                state.mirror.as_ref(),
                std::slice::from_ref(&item),
                std::slice::from_ref(&old),
            );
            state.items[index] = item.clone();
            (
                commit(&mut state, CollectionChange::replaced(vec![old.clone()], vec![item], index), op),
                old,
            )
        };
        self.deliver(pending);
        Some(old)
    }

    /// Mutates the first item matching `predicate` in place, reported as a Replace.
    ///
    /// If the update changes the item's group key, the grouping mirror moves it to the new
    /// group. Returns false if nothing matched.
    pub fn update_where(&self, predicate: impl Fn(&T) -> bool, update: impl FnOnce(&mut T)) -> bool {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let Some(index) = state.items.iter().position(|x| predicate(x)) else {
                return false;
            };
            let old = state.items[index].clone();
            let mut updated = old.clone();
            update(&mut updated);
            let op = plan_update(
                state.mirror.as_ref(),
                std::slice::from_ref(&updated),
                std::slice::from_ref(&old),
            );
            state.items[index] = updated.clone();
            commit(&mut state, CollectionChange::replaced(vec![old], vec![updated], index), op)
        };
        self.deliver(pending);
        true
    }

    // ========================================
    // Range mutations
    // ========================================

    /// Appends all items as one Add. An empty range is a no-op.
    pub fn add_range(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let op = plan_update(state.mirror.as_ref(), &items, &[]);
            let index = state.items.len();
            state.items.extend(items.iter().cloned());
            commit(&mut state, CollectionChange::added(items, index), op)
        };
        self.deliver(pending);
    }

    /// Inserts all items at `index` (clamped to the length) as one Add.
    pub fn insert_range(&self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let op = plan_update(state.mirror.as_ref(), &items, &[]);
            let index = index.min(state.items.len());
            state.items.splice(index..index, items.iter().cloned());
            commit(&mut state, CollectionChange::added(items, index), op)
        };
        self.deliver(pending);
    }

    /// Removes up to `count` items starting at `index` as one Remove.
    pub fn remove_range(&self, index: usize, count: usize) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let end = index.saturating_add(count).min(state.items.len());
            if index >= end {
                return;
            }
            let removed = state.items[index..end].to_vec();
            let op = plan_update(state.mirror.as_ref(), &[], &removed);
            state.items.drain(index..end);
            commit(&mut state, CollectionChange::removed(removed, index), op)
        };
        self.deliver(pending);
    }

    /// Overwrites `items.len()` items starting at `index` as one Replace. Items that run past
    /// the end are appended.
    pub fn replace_range(&self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let index = index.min(state.items.len());
            let end = (index + items.len()).min(state.items.len());
            let old = state.items[index..end].to_vec();
            let op = plan_update(state.mirror.as_ref(), &items, &old);
            state.items.splice(index..end, items.iter().cloned());
            commit(&mut state, CollectionChange::replaced(old, items, index), op)
        };
        self.deliver(pending);
    }

    /// Removes everything, reported as one Reset. Groups are dropped with their members.
    pub fn clear(&self) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            state.items.clear();
            let op = state.mirror.as_ref().map(|_| MirrorOp::Clear);
            commit(&mut state, CollectionChange::reset(), op)
        };
        self.deliver(pending);
    }

    /// Replaces the entire contents, reported as one Reset. Groups are rebuilt from scratch.
    pub fn reset_with(&self, items: Vec<T>) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let op = state
                .mirror
                .as_ref()
                .map(|mirror| plan_rebuild(mirror, &items));
            state.items = items;
            commit(&mut state, CollectionChange::reset(), op)
        };
        self.deliver(pending);
    }

    // ========================================
    // Ordering
    // ========================================

    /// Reorders the whole sequence by `compare`, reported as a single Replace.
    ///
    /// The comparator runs under the collection lock and must not touch this collection.
    /// Group membership is unaffected by a permutation, so the mirror is left alone.
    pub fn order(&self, compare: impl FnMut(&T, &T) -> Ordering) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            if state.items.is_empty() {
                return;
            }
            let mut sorted = state.items.clone();
            sorted.sort_by(compare);
            let old = std::mem::replace(&mut state.items, sorted.clone());
            commit(&mut state, CollectionChange::replaced(old, sorted, 0), None)
        };
        self.deliver(pending);
        self.set_sorted(true);
    }

    /// Moves `item` to the position `compare` gives it, as one Remove plus one Add.
    /// Returns false if the item is not in the collection.
    pub fn order_one(&self, mut compare: impl FnMut(&T, &T) -> Ordering, item: &T) -> bool {
        let (removal, insertion) = {
            let mut state = self.state.lock_ignore_poison();
            let Some(from) = state.items.iter().position(|x| x == item) else {
                return false;
            };
            let mut sorted = state.items.clone();
            sorted.sort_by(&mut compare);
            let to = sorted.iter().position(|x| x == item).unwrap_or(from);

            let moved = state.items.remove(from);
            let removal = commit(&mut state, CollectionChange::removed(vec![moved.clone()], from), None);
            state.items.insert(to, moved.clone());
            let insertion = commit(&mut state, CollectionChange::added(vec![moved], to), None);
            (removal, insertion)
        };
        self.deliver(removal);
        self.deliver(insertion);
        true
    }

    // ========================================
    // Bulk operations
    // ========================================

    /// Suspends notifications until the matching [`end_bulk_operation`](Self::end_bulk_operation).
    /// Nests: only the outermost pair has an effect.
    pub fn begin_bulk_operation(&self) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            state.bulk_depth += 1;
            if state.bulk_depth > 1 {
                return;
            }
            let Some(mirror) = state.mirror.clone() else {
                return;
            };
            take_ticket(&mut state, Some((mirror, MirrorOp::BeginBulk)), None)
        };
        self.deliver(pending);
    }

    /// Ends a bulk operation. The outermost end emits exactly one Reset, after every group has
    /// ended its own bulk operation. Unbalanced calls are ignored.
    pub fn end_bulk_operation(&self) {
        let (pending, count) = {
            let mut state = self.state.lock_ignore_poison();
            if state.bulk_depth == 0 {
                return;
            }
            state.bulk_depth -= 1;
            if state.bulk_depth > 0 {
                return;
            }
            let op = state.mirror.as_ref().map(|_| MirrorOp::EndBulk);
            let count = state.items.len();
            (commit(&mut state, CollectionChange::reset(), op), count)
        };
        self.deliver(pending);
        log::debug!(
            "end_bulk_operation: items={}, groups={}",
            count,
            self.groups().map_or(0, |groups| groups.len())
        );
    }

    // ========================================
    // Grouping
    // ========================================

    pub fn is_grouped(&self) -> bool {
        self.state.lock_ignore_poison().mirror.is_some()
    }

    /// The live groups collection, or `None` when grouping is off.
    pub fn groups(&self) -> Option<Arc<ConcurrentGroupedCollection<Arc<Group<T>>>>> {
        let mirror = self.state.lock_ignore_poison().mirror.clone();
        mirror.map(|mirror| mirror.groups())
    }

    /// Installs (or with `None`, tears down) the grouping mirror. An installed mirror keeps its
    /// header populator.
    ///
    /// Installing a key selector regroups every current item with it, so the mirror is never
    /// out of step with the flat contents. A panicking selector leaves grouping as it was.
    pub fn set_grouping(&self, key_selector: Option<KeySelector<T>>) {
        let Some(key_selector) = key_selector else {
            self.state.lock_ignore_poison().mirror = None;
            return;
        };
        self.install_grouping(key_selector, None, false);
    }

    /// Installs a key selector together with the populator that fills the headers of the
    /// groups it forms, regrouping once.
    pub fn set_grouping_with_headers(&self, key_selector: KeySelector<T>, populator: HeaderPopulator<T>) {
        self.install_grouping(key_selector, Some(populator), true);
    }

    fn install_grouping(&self, key_selector: KeySelector<T>, populator: Option<HeaderPopulator<T>>, replace_populator: bool) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let populator = match (&state.mirror, replace_populator) {
                (Some(mirror), false) => mirror.header_populator(),
                _ => populator,
            };

            // Keys and headers first: nothing changes if a policy function panics.
            let keyed = key_all(key_selector.as_ref(), &state.items);
            let headers = draft_headers(populator.as_ref(), &keyed);

            let (mirror, fresh) = match state.mirror.clone() {
                Some(mirror) => (mirror, false),
                None => {
                    let mirror: Arc<dyn MembershipMirror<T>> = Arc::new(GroupIndex::new(Arc::clone(&key_selector)));
                    state.mirror = Some(Arc::clone(&mirror));
                    (mirror, true)
                }
            };
            mirror.set_key_selector(key_selector);
            mirror.set_header_populator(populator);

            let mut pending = Vec::new();
            if fresh && state.bulk_depth > 0 {
                pending.push(take_ticket(&mut state, Some((Arc::clone(&mirror), MirrorOp::BeginBulk)), None));
            }
            let rebuild = MirrorOp::Rebuild { keyed, headers };
            pending.push(take_ticket(&mut state, Some((mirror, rebuild)), None));
            pending
        };
        for work in pending {
            self.deliver(work);
        }
    }

    /// Sets the callback that fills headers of groups created from now on.
    ///
    /// It runs while the change creating the group is committed, on a detached copy of the
    /// group holding its first member, and must not call back into this collection.
    pub fn set_group_header_populator(&self, populator: Option<HeaderPopulator<T>>) {
        if let Some(mirror) = self.state.lock_ignore_poison().mirror.clone() {
            mirror.set_header_populator(populator);
        }
    }

    /// Recomputes every item's group from the current key selector and rebuilds the groups.
    ///
    /// For when the keys themselves changed (for example, relative date buckets rolled over),
    /// not for individual item changes, which the mirror tracks on its own.
    pub fn reset_groups(&self) {
        let pending = {
            let mut state = self.state.lock_ignore_poison();
            let Some(mirror) = state.mirror.clone() else {
                return;
            };
            let rebuild = plan_rebuild(&mirror, &state.items);
            take_ticket(&mut state, Some((mirror, rebuild)), None)
        };
        self.deliver(pending);
    }

    // ========================================
    // Delivery
    // ========================================

    fn deliver(&self, pending: Pending<T>) {
        let _turn = self.sequencer.wait_for(pending.ticket);
        if let Some((mirror, op)) = pending.mirror_op {
            mirror.apply(op);
        }
        if let Some(change) = pending.change {
            let listeners: Vec<Listener<T>> = self
                .listeners
                .read_ignore_poison()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&change);
            }
        }
    }
}

/// Records a structural change: the notification is kept unless a bulk operation is running.
fn commit<T>(state: &mut State<T>, change: CollectionChange<T>, op: Option<MirrorOp<T>>) -> Pending<T> {
    let mirror_op = match (op, state.mirror.clone()) {
        (Some(op), Some(mirror)) => Some((mirror, op)),
        _ => None,
    };
    let change = (state.bulk_depth == 0).then_some(change);
    take_ticket(state, mirror_op, change)
}

fn take_ticket<T>(
    state: &mut State<T>,
    mirror_op: Option<(Arc<dyn MembershipMirror<T>>, MirrorOp<T>)>,
    change: Option<CollectionChange<T>>,
) -> Pending<T> {
    let ticket = state.next_ticket;
    state.next_ticket += 1;
    Pending {
        ticket,
        mirror_op,
        change,
    }
}

/// Keys the added and removed items and drafts headers for the added keys up front, so a
/// panicking policy function aborts the mutation before it starts.
fn plan_update<T>(mirror: Option<&Arc<dyn MembershipMirror<T>>>, added: &[T], removed: &[T]) -> Option<MirrorOp<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mirror = mirror?;
    let key = |item: &T| (mirror.key_of(item), item.clone());
    let added: Vec<(String, T)> = added.iter().map(key).collect();
    let headers = draft_headers(mirror.header_populator().as_ref(), &added);
    Some(MirrorOp::Update {
        added,
        removed: removed.iter().map(key).collect(),
        headers,
    })
}

fn plan_rebuild<T>(mirror: &Arc<dyn MembershipMirror<T>>, items: &[T]) -> MirrorOp<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let keyed = key_all(&|item: &T| mirror.key_of(item), items);
    let headers = draft_headers(mirror.header_populator().as_ref(), &keyed);
    MirrorOp::Rebuild { keyed, headers }
}

fn key_all<T: Clone + Send + Sync>(key_of: &(dyn Fn(&T) -> String + Send + Sync), items: &[T]) -> Vec<(String, T)> {
    items.par_iter().map(|item| (key_of(item), item.clone())).collect()
}
