use super::entry::Entry;
use super::grouping::GroupOption;
use super::sorting::{SortDirection, SortOption, SortPolicy};
use super::view::ListingView;
use crate::collection::ChangeKind;
use crate::config::ListingSettings;
use crate::enumeration::Completion;
use crate::enumeration::source::{EntrySource, RawRecord, RecordCursor, SourceError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct MemorySource(Vec<RawRecord>);

impl EntrySource for MemorySource {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn read_batch(&self, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.0.iter().skip(offset).take(count).cloned().collect())
    }

    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError> {
        Ok(Box::new(VecCursor(self.0.clone().into_iter())))
    }
}

struct VecCursor(std::vec::IntoIter<RawRecord>);

impl RecordCursor for VecCursor {
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>> {
        self.0.next().map(Ok)
    }
}

struct EndlessSource;

impl EntrySource for EndlessSource {
    fn location(&self) -> String {
        "endless".to_string()
    }

    fn read_batch(&self, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError> {
        Ok((offset..offset + count)
            .map(|i| RawRecord::file(format!("f{}", i), format!("/endless/f{}", i)))
            .collect())
    }

    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

fn file(name: &str, size: u64) -> RawRecord {
    RawRecord {
        size: Some(size),
        ..RawRecord::file(name, format!("/dir/{}", name))
    }
}

fn numbered_files(count: usize) -> Arc<dyn EntrySource> {
    Arc::new(MemorySource((0..count).rev().map(|i| file(&format!("file{}.txt", i), 10)).collect()))
}

fn names(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|e| e.name().to_string()).collect()
}

fn header_texts(view: &ListingView) -> Vec<String> {
    view.groups()
        .unwrap()
        .snapshot()
        .iter()
        .map(|group| group.header().text)
        .collect()
}

fn size_grouped() -> ListingSettings {
    ListingSettings {
        group_option: GroupOption::Size,
        ..ListingSettings::default()
    }
}

#[tokio::test]
async fn test_load_merges_sorted_entries_with_resets_only() {
    let view = ListingView::new(&ListingSettings::default());
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&kinds);
    view.entries().subscribe(move |change| seen.lock().unwrap().push(change.kind));

    let completion = view.load(numbered_files(700)).await;

    assert_eq!(completion, Completion::Exhausted);
    assert_eq!(view.entries().len(), 700);
    let listed = names(&view.entries().snapshot());
    assert_eq!(listed[..3], ["file0.txt", "file1.txt", "file2.txt"]);
    assert_eq!(listed[10], "file10.txt");

    // One Reset for the initial clear, then one per merged flush
    let kinds = kinds.lock().unwrap();
    assert!(kinds.len() >= 3, "expected several merges, got {:?}", kinds);
    assert!(kinds.iter().all(|kind| *kind == ChangeKind::Reset));
}

#[tokio::test]
async fn test_load_from_cursor() {
    let view = ListingView::new(&ListingSettings::default());
    let cursor = Box::new(VecCursor(vec![file("b.txt", 1), file("a.txt", 2)].into_iter()));

    let completion = view.load_from_cursor(cursor).await;

    assert_eq!(completion, Completion::Exhausted);
    assert_eq!(names(&view.entries().snapshot()), ["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_reload_replaces_previous_contents() {
    let view = ListingView::new(&ListingSettings::default());
    view.load(numbered_files(50)).await;
    view.load(Arc::new(MemorySource(vec![file("only.txt", 1)]))).await;

    assert_eq!(names(&view.entries().snapshot()), ["only.txt"]);
}

#[tokio::test]
async fn test_size_groups_order_by_magnitude_with_folders_first() {
    let view = ListingView::new(&size_grouped());
    let source = MemorySource(vec![
        file("small.bin", 500),
        RawRecord::directory("docs", "/dir/docs"),
        file("huge.bin", 6_000_000_000),
        file("medium.bin", 2_000_000),
    ]);

    view.load(Arc::new(source)).await;

    assert_eq!(header_texts(&view), ["Folders", "Huge", "Medium", "Tiny"]);
    assert!(view.groups().unwrap().is_sorted());

    view.set_group_option(GroupOption::Size, SortDirection::Descending);
    assert_eq!(header_texts(&view), ["Folders", "Tiny", "Medium", "Huge"]);
}

#[tokio::test]
async fn test_set_sort_policy_reorders_items_and_groups() {
    let settings = ListingSettings {
        group_option: GroupOption::Name,
        ..ListingSettings::default()
    };
    let view = ListingView::new(&settings);
    let source = MemorySource(vec![
        file("apple2.txt", 1),
        file("banana.txt", 1),
        file("apple10.txt", 1),
        file("apple1.txt", 1),
    ]);
    view.load(Arc::new(source)).await;

    let groups = view.groups().unwrap();
    let first = groups.first().unwrap();
    assert_eq!(first.key(), "A");
    assert_eq!(names(&first.items().snapshot()), ["apple1.txt", "apple2.txt", "apple10.txt"]);

    view.set_sort_policy(SortPolicy::new(SortOption::Name, SortDirection::Descending));

    assert_eq!(view.sort_policy().direction, SortDirection::Descending);
    assert_eq!(
        names(&view.entries().snapshot()),
        ["banana.txt", "apple10.txt", "apple2.txt", "apple1.txt"]
    );
    let first = view.groups().unwrap().first().unwrap();
    assert_eq!(names(&first.items().snapshot()), ["apple10.txt", "apple2.txt", "apple1.txt"]);
}

#[tokio::test]
async fn test_set_group_option_regroups_without_reloading() {
    let view = ListingView::new(&ListingSettings::default());
    view.load(Arc::new(MemorySource(vec![
        file("b.txt", 1),
        file("a.txt", 2),
        file("c.txt", 3),
    ])))
    .await;
    assert!(view.groups().is_none());

    view.set_group_option(GroupOption::Name, SortDirection::Ascending);

    assert_eq!(view.group_option(), GroupOption::Name);
    assert_eq!(header_texts(&view), ["A", "B", "C"]);
    let total: usize = view.groups().unwrap().iter().map(|group| group.len()).sum();
    assert_eq!(total, 3);
    let first = view.groups().unwrap().first().unwrap();
    assert_eq!(first.header().count_text, "1 item");

    view.set_group_option(GroupOption::None, SortDirection::Ascending);
    assert!(view.groups().is_none());
    assert_eq!(view.entries().len(), 3);
}

#[tokio::test]
async fn test_update_entry_moves_between_groups_in_order() {
    let view = ListingView::new(&size_grouped());
    view.load(Arc::new(MemorySource(vec![
        file("a.bin", 500),
        file("b.bin", 600),
        file("c.bin", 2_000_000),
    ])))
    .await;
    assert_eq!(header_texts(&view), ["Medium", "Tiny"]);

    let id = view.entries().find(|e| e.name() == "b.bin").unwrap().id();
    assert!(view.update_entry(id, |entry| entry.size = Some(6_000_000_000)));

    assert_eq!(header_texts(&view), ["Huge", "Medium", "Tiny"]);
    let huge = view.groups().unwrap().first().unwrap();
    assert_eq!(names(&huge.items().snapshot()), ["b.bin"]);
    assert_eq!(view.entries().len(), 3);

    let stranger = Entry::new("x", "/x", crate::listing::entry::EntryKind::File);
    assert!(!view.update_entry(stranger.id(), |entry| entry.size = Some(1)));
}

#[tokio::test]
async fn test_update_entry_repositions_by_sort_policy() {
    let settings = ListingSettings {
        sort: SortPolicy::new(SortOption::Size, SortDirection::Ascending),
        ..ListingSettings::default()
    };
    let view = ListingView::new(&settings);
    view.load(Arc::new(MemorySource(vec![file("a", 1), file("b", 2), file("c", 3)]))).await;

    let id = view.entries().first().unwrap().id();
    view.update_entry(id, |entry| entry.size = Some(10));

    assert_eq!(names(&view.entries().snapshot()), ["b", "c", "a"]);
}

#[tokio::test]
async fn test_cancel_from_observer_stops_endless_load() {
    let view = Arc::new(ListingView::new(&ListingSettings::default()));
    let weak = Arc::downgrade(&view);
    let merges = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&merges);
    view.entries().subscribe(move |change| {
        if change.kind == ChangeKind::Reset
            && counter.fetch_add(1, Ordering::SeqCst) >= 3
            && let Some(view) = weak.upgrade()
        {
            view.cancel();
        }
    });

    let completion = tokio::time::timeout(std::time::Duration::from_secs(10), view.load(Arc::new(EndlessSource)))
        .await
        .expect("load should stop after cancellation");

    assert_eq!(completion, Completion::Cancelled);
    // Cancellation keeps what was merged
    assert!(view.entries().len() >= 32);
}

#[tokio::test]
async fn test_close_clears_and_tears_down_grouping() {
    let view = ListingView::new(&size_grouped());
    view.load(numbered_files(40)).await;
    assert!(view.groups().is_some());

    view.close();

    assert!(view.entries().is_empty());
    assert!(view.groups().is_none());
}
