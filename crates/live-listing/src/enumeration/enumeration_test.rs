//! Tests for both producer variants and the local filesystem source.

use super::batched::list_entries;
use super::convert::VisibilityPolicy;
use super::local::LocalDirectorySource;
use super::sequential::list_entries_from_cursor;
use super::source::{EntrySource, RawRecord, RecordCursor, SourceError};
use super::{BatchSizing, CancellationFlag, Completion, ListingOptions};
use crate::listing::entry::{Entry, EntryKind};
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test sources
// ============================================================================

/// Serves a fixed record list, optionally failing batched reads from some offset on.
#[derive(Default)]
struct MemorySource {
    records: Vec<RawRecord>,
    requested: Mutex<Vec<usize>>,
    fail_batches_from: Option<(usize, SourceError)>,
    cursor_error: Option<SourceError>,
}

impl MemorySource {
    fn with_files(count: usize) -> Self {
        Self {
            records: (0..count).map(|i| record(&format!("file{}.txt", i))).collect(),
            ..Self::default()
        }
    }

    fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

impl EntrySource for MemorySource {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn read_batch(&self, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError> {
        self.requested.lock().unwrap().push(count);
        if let Some((from, err)) = &self.fail_batches_from
            && offset >= *from
        {
            return Err(err.clone());
        }
        Ok(self.records.iter().skip(offset).take(count).cloned().collect())
    }

    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError> {
        if let Some(err) = &self.cursor_error {
            return Err(err.clone());
        }
        let items: Vec<_> = self.records.iter().cloned().map(Ok).collect();
        Ok(Box::new(VecCursor(items.into_iter())))
    }
}

/// Never runs out of records.
struct EndlessSource;

impl EntrySource for EndlessSource {
    fn location(&self) -> String {
        "endless".to_string()
    }

    fn read_batch(&self, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError> {
        Ok((offset..offset + count).map(|i| record(&format!("f{}", i))).collect())
    }

    fn open_sequential(&self) -> Result<Box<dyn RecordCursor>, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

struct VecCursor(std::vec::IntoIter<Result<RawRecord, SourceError>>);

impl RecordCursor for VecCursor {
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>> {
        self.0.next()
    }
}

fn record(name: &str) -> RawRecord {
    RawRecord::file(name, format!("/mem/{}", name))
}

/// Flush callback that records batch sizes.
fn recording_flush() -> (
    Arc<Mutex<Vec<usize>>>,
    impl FnMut(Vec<Entry>) -> BoxFuture<'static, ()> + Send,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let flush = move |batch: Vec<Entry>| -> BoxFuture<'static, ()> {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(batch.len());
        })
    };
    (seen, flush)
}

fn names(entries: &[Entry]) -> HashSet<String> {
    entries.iter().map(|e| e.name().to_string()).collect()
}

// ============================================================================
// Batched producer
// ============================================================================

#[tokio::test]
async fn test_pre_cancelled_listing_returns_immediately() {
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        list_entries(Arc::new(EndlessSource), &cancel, &ListingOptions::default(), None),
    )
    .await
    .expect("listing must not block");

    assert!(outcome.entries.is_empty());
    assert_eq!(outcome.completion, Completion::Cancelled);
}

#[tokio::test]
async fn test_three_medium_batches_flush_at_least_three_times() {
    let source = Arc::new(MemorySource::with_files(900));
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries(
        Arc::clone(&source) as Arc<dyn EntrySource>,
        &CancellationFlag::new(),
        &ListingOptions::default(),
        Some(&mut flush),
    )
    .await;

    let flushes = seen.lock().unwrap().clone();
    assert!(flushes.len() >= 3, "flushes: {:?}", flushes);
    assert_eq!(flushes.iter().sum::<usize>() + outcome.entries.len(), 900);
    assert_eq!(outcome.flushed, flushes.iter().sum::<usize>());
    assert_eq!(outcome.completion, Completion::Exhausted);
    assert_eq!(&source.requested()[..3], &[32, 300, 300]);
}

#[tokio::test]
async fn test_unobserved_listing_uses_large_batches() {
    let source = Arc::new(MemorySource::with_files(1500));

    let outcome = list_entries(
        Arc::clone(&source) as Arc<dyn EntrySource>,
        &CancellationFlag::new(),
        &ListingOptions::default(),
        None,
    )
    .await;

    assert_eq!(outcome.entries.len(), 1500);
    assert_eq!(outcome.flushed, 0);
    assert_eq!(&source.requested()[..3], &[32, 1000, 1000]);
}

#[tokio::test]
async fn test_elapsed_interval_flushes_a_short_batch() {
    let options = ListingOptions {
        batching: BatchSizing {
            flush_interval_ms: 0,
            ..BatchSizing::default()
        },
        ..ListingOptions::default()
    };
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries(
        Arc::new(MemorySource::with_files(10)),
        &CancellationFlag::new(),
        &options,
        Some(&mut flush),
    )
    .await;

    assert_eq!(*seen.lock().unwrap(), vec![10]);
    assert!(outcome.entries.is_empty());
}

#[tokio::test]
async fn test_count_limit_stops_listing() {
    let options = ListingOptions {
        count_limit: Some(10),
        ..ListingOptions::default()
    };

    let outcome = list_entries(Arc::new(EndlessSource), &CancellationFlag::new(), &options, None).await;

    assert_eq!(outcome.entries.len(), 10);
    assert_eq!(outcome.completion, Completion::LimitReached);
}

#[tokio::test]
async fn test_filtered_records_do_not_count_toward_limit() {
    let records = (0..40)
        .map(|i| RawRecord {
            is_hidden: i % 2 == 0,
            ..record(&format!("f{}", i))
        })
        .collect();
    let source = MemorySource {
        records,
        ..MemorySource::default()
    };
    let options = ListingOptions {
        count_limit: Some(5),
        visibility: VisibilityPolicy::default(),
        ..ListingOptions::default()
    };

    let outcome = list_entries(Arc::new(source), &CancellationFlag::new(), &options, None).await;

    assert_eq!(outcome.entries.len(), 5);
    assert!(outcome.entries.iter().all(|e| !e.is_hidden));
}

/// 32 records with the first four hidden, then 300 visible ones.
fn partly_hidden_records() -> Vec<RawRecord> {
    (0..332)
        .map(|i| RawRecord {
            is_hidden: i < 4,
            ..record(&format!("f{}", i))
        })
        .collect()
}

fn slow_flush_options() -> ListingOptions {
    ListingOptions {
        batching: BatchSizing {
            flush_interval_ms: 3_600_000,
            ..BatchSizing::default()
        },
        ..ListingOptions::default()
    }
}

#[tokio::test]
async fn test_filtered_records_do_not_fill_a_batch() {
    let source = MemorySource {
        records: partly_hidden_records(),
        ..MemorySource::default()
    };
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries(Arc::new(source), &CancellationFlag::new(), &slow_flush_options(), Some(&mut flush)).await;

    // The first batch kept 28 of 32, so it waits for the next full one
    assert_eq!(*seen.lock().unwrap(), vec![328]);
    assert!(outcome.entries.is_empty());
    assert_eq!(outcome.completion, Completion::Exhausted);
}

#[tokio::test]
async fn test_filtered_records_do_not_fill_a_cursor_chunk() {
    let items: Vec<_> = partly_hidden_records().into_iter().map(Ok).collect();
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries_from_cursor(
        Box::new(VecCursor(items.into_iter())),
        &CancellationFlag::new(),
        &slow_flush_options(),
        Some(&mut flush),
    )
    .await;

    assert_eq!(*seen.lock().unwrap(), vec![328]);
    assert!(outcome.entries.is_empty());
}

#[tokio::test]
async fn test_cancel_during_flush_stops_after_that_batch() {
    let cancel = CancellationFlag::new();
    let canceller = cancel.clone();
    let mut flush = move |_batch: Vec<Entry>| -> BoxFuture<'static, ()> {
        canceller.cancel();
        Box::pin(async {})
    };

    let outcome = list_entries(Arc::new(EndlessSource), &cancel, &ListingOptions::default(), Some(&mut flush)).await;

    assert_eq!(outcome.flushed, 32);
    assert!(outcome.entries.is_empty());
    assert_eq!(outcome.completion, Completion::Cancelled);
}

#[tokio::test]
async fn test_transient_batch_error_falls_back_to_cursor() {
    let source = MemorySource {
        fail_batches_from: Some((32, SourceError::AccessDenied("/mem".to_string()))),
        ..MemorySource::with_files(100)
    };

    let outcome = list_entries(Arc::new(source), &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(outcome.completion, Completion::Exhausted);
    assert_eq!(outcome.entries.len(), 100);
    assert_eq!(names(&outcome.entries).len(), 100, "no record may be listed twice");
}

#[tokio::test]
async fn test_not_implemented_from_the_start_reads_sequentially() {
    let source = MemorySource {
        fail_batches_from: Some((0, SourceError::NotImplemented)),
        ..MemorySource::with_files(50)
    };
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries(
        Arc::new(source),
        &CancellationFlag::new(),
        &ListingOptions::default(),
        Some(&mut flush),
    )
    .await;

    let flushed: usize = seen.lock().unwrap().iter().sum();
    assert_eq!(flushed + outcome.entries.len(), 50);
    assert_eq!(outcome.completion, Completion::Exhausted);
}

#[tokio::test]
async fn test_unrecognized_error_returns_partial_result() {
    let source = MemorySource {
        fail_batches_from: Some((32, SourceError::Io("device unplugged".to_string()))),
        ..MemorySource::with_files(100)
    };

    let outcome = list_entries(Arc::new(source), &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(outcome.entries.len(), 32);
    assert!(matches!(outcome.completion, Completion::Interrupted(SourceError::Io(_))));
}

#[tokio::test]
async fn test_failed_fallback_returns_partial_result() {
    let source = MemorySource {
        fail_batches_from: Some((32, SourceError::NotImplemented)),
        cursor_error: Some(SourceError::AccessDenied("/mem".to_string())),
        ..MemorySource::with_files(100)
    };

    let outcome = list_entries(Arc::new(source), &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(outcome.entries.len(), 32);
    assert!(matches!(outcome.completion, Completion::Interrupted(SourceError::AccessDenied(_))));
}

// ============================================================================
// Sequential producer
// ============================================================================

#[tokio::test]
async fn test_cursor_skips_unreadable_records() {
    let items = vec![
        Ok(record("a")),
        Err(SourceError::AccessDenied("/mem/b".to_string())),
        Ok(record("c")),
        Ok(RawRecord::directory("..", "/mem/..")),
    ];
    let cursor = Box::new(VecCursor(items.into_iter()));

    let outcome = list_entries_from_cursor(cursor, &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(names(&outcome.entries), HashSet::from(["a".to_string(), "c".to_string()]));
    assert_eq!(outcome.completion, Completion::Exhausted);
}

#[tokio::test]
async fn test_cursor_stops_on_unrecoverable_error() {
    let items = vec![Ok(record("a")), Err(SourceError::Io("bad sector".to_string())), Ok(record("c"))];
    let cursor = Box::new(VecCursor(items.into_iter()));

    let outcome = list_entries_from_cursor(cursor, &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(names(&outcome.entries), HashSet::from(["a".to_string()]));
    assert!(matches!(outcome.completion, Completion::Interrupted(_)));
}

#[tokio::test]
async fn test_cursor_uses_same_batch_sizes() {
    let items: Vec<_> = (0..700).map(|i| Ok(record(&format!("f{}", i)))).collect();
    let cursor = Box::new(VecCursor(items.into_iter()));
    let (seen, mut flush) = recording_flush();

    let outcome = list_entries_from_cursor(cursor, &CancellationFlag::new(), &ListingOptions::default(), Some(&mut flush)).await;

    let flushes = seen.lock().unwrap().clone();
    assert_eq!(&flushes[..3], &[32, 300, 300]);
    assert_eq!(flushes.iter().sum::<usize>() + outcome.entries.len(), 700);
}

// ============================================================================
// Local filesystem
// ============================================================================

#[tokio::test]
async fn test_local_directory_listing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join(".hidden"), b"").unwrap();
    std::fs::write(dir.path().join("b.zip"), b"PK").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let source: Arc<dyn EntrySource> = Arc::new(LocalDirectorySource::new(dir.path()));

    let outcome = list_entries(Arc::clone(&source), &CancellationFlag::new(), &ListingOptions::default(), None).await;

    assert_eq!(outcome.completion, Completion::Exhausted);
    assert_eq!(
        names(&outcome.entries),
        HashSet::from(["a.txt", ".hidden", "b.zip", "sub"].map(String::from))
    );
    let by_name = |name: &str| outcome.entries.iter().find(|e| e.name() == name).expect("listed");
    assert_eq!(by_name("a.txt").size, Some(5));
    assert!(by_name("a.txt").modified_at.is_some());
    assert_eq!(by_name("sub").kind(), EntryKind::Directory);
    assert!(matches!(by_name("b.zip").kind(), EntryKind::Synthetic(_)));

    let no_dots = ListingOptions {
        visibility: VisibilityPolicy {
            show_dot_files: false,
            ..VisibilityPolicy::default()
        },
        ..ListingOptions::default()
    };
    let outcome = list_entries(source, &CancellationFlag::new(), &no_dots, None).await;
    assert!(!names(&outcome.entries).contains(".hidden"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_symlinks_report_target_kind() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::create_dir(dir.path().join("target_dir")).unwrap();
    std::fs::write(dir.path().join("target.txt"), b"x").unwrap();
    std::os::unix::fs::symlink(dir.path().join("target_dir"), dir.path().join("link_dir")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt")).unwrap();

    let outcome = list_entries(
        Arc::new(LocalDirectorySource::new(dir.path())),
        &CancellationFlag::new(),
        &ListingOptions::default(),
        None,
    )
    .await;

    let kind = |name: &str| outcome.entries.iter().find(|e| e.name() == name).map(|e| e.kind());
    assert_eq!(kind("link_dir"), Some(EntryKind::SymlinkToDirectory));
    assert_eq!(kind("link.txt"), Some(EntryKind::SymlinkToFile));
}

#[tokio::test]
async fn test_missing_directory_is_interrupted_not_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("nope");

    let outcome = list_entries(
        Arc::new(LocalDirectorySource::new(missing)),
        &CancellationFlag::new(),
        &ListingOptions::default(),
        None,
    )
    .await;

    assert!(outcome.entries.is_empty());
    assert!(matches!(outcome.completion, Completion::Interrupted(SourceError::NotFound(_))));
}
