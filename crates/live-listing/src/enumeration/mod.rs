//! Producer side of a listing: reads an entry source in adaptively sized batches, filters and
//! converts records, and hands intermediate results to a flush callback.
//!
//! Two variants share one contract:
//! - `batched::list_entries` reads by offset and falls back to a cursor when batched reads fail
//!   with a recoverable error.
//! - `sequential::list_entries_from_cursor` reads one record at a time from a cursor.
//!
//! Neither ever returns an error. Cancellation, count limits and source failures all end the
//! listing early with the entries produced so far, and the [`Completion`] says why.
//!
//! ## Batch sizing
//!
//! The first batch is small, for a fast first paint. Later batches are medium-sized when a flush
//! callback observes progress, and large otherwise. After a batch, buffered entries are flushed
//! when the batch came back full or the flush interval has elapsed. The flush is awaited before
//! the next read, so a slow consumer slows the producer down.

pub mod batched;
pub mod convert;
pub mod local;
pub mod sampler;
pub mod sequential;
pub mod source;

#[cfg(test)]
mod enumeration_test;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::listing::entry::Entry;
use convert::{EntryClassifier, ExtensionClassifier, VisibilityPolicy, convert_record};
use sampler::IntervalSampler;
use source::{RawRecord, SourceError};

/// Receives each intermediate batch of entries. The listing awaits the returned future.
pub type IntermediateFlush<'a> = &'a mut (dyn FnMut(Vec<Entry>) -> BoxFuture<'static, ()> + Send + 'a);

/// Cooperative cancellation token, cheap to clone and share with the consumer.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a listing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The source ran out of records.
    Exhausted,
    Cancelled,
    /// The count limit was reached; the source may have more.
    LimitReached,
    /// The source failed and no fallback could continue.
    Interrupted(SourceError),
}

/// Result of a listing.
#[derive(Debug)]
pub struct ListingOutcome {
    /// Entries produced since the last intermediate flush (all of them, without a flush callback).
    pub entries: Vec<Entry>,
    /// Number of entries handed to the flush callback.
    pub flushed: usize,
    pub completion: Completion,
}

/// Batch sizes and flush pacing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSizing {
    #[serde(alias = "first_batch")]
    pub first_batch: usize,
    /// Later batches while a flush callback observes progress.
    #[serde(alias = "medium_batch")]
    pub medium_batch: usize,
    /// Later batches without a flush callback.
    #[serde(alias = "large_batch")]
    pub large_batch: usize,
    #[serde(alias = "flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for BatchSizing {
    fn default() -> Self {
        Self {
            first_batch: 32,
            medium_batch: 300,
            large_batch: 1000,
            flush_interval_ms: 500,
        }
    }
}

impl BatchSizing {
    /// Size of the next batch after `batches_done` batches. Never zero.
    pub fn batch_size(&self, batches_done: usize, observed: bool) -> usize {
        let size = if batches_done == 0 {
            self.first_batch
        } else if observed {
            self.medium_batch
        } else {
            self.large_batch
        };
        size.max(1)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Everything a listing needs besides the source and the flush callback.
#[derive(Clone)]
pub struct ListingOptions {
    pub visibility: VisibilityPolicy,
    pub batching: BatchSizing,
    /// Stop after this many accepted entries.
    pub count_limit: Option<usize>,
    pub classifier: Arc<dyn EntryClassifier>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            visibility: VisibilityPolicy::default(),
            batching: BatchSizing::default(),
            count_limit: None,
            classifier: Arc::new(ExtensionClassifier),
        }
    }
}

// ============================================================================
// Shared accumulation
// ============================================================================

/// Filtering, buffering and flushing state shared by both producer variants.
pub(crate) struct Accumulator<'o, 'f> {
    options: &'o ListingOptions,
    cancel: &'o CancellationFlag,
    flush: Option<IntermediateFlush<'f>>,
    sampler: IntervalSampler,
    buffer: Vec<Entry>,
    accepted: usize,
    accepted_in_batch: usize,
    flushed: usize,
    batches: usize,
    started: Instant,
}

impl<'o, 'f> Accumulator<'o, 'f> {
    pub(crate) fn new(options: &'o ListingOptions, cancel: &'o CancellationFlag, flush: Option<IntermediateFlush<'f>>) -> Self {
        Self {
            options,
            cancel,
            flush,
            sampler: IntervalSampler::new(options.batching.flush_interval()),
            buffer: Vec::new(),
            accepted: 0,
            accepted_in_batch: 0,
            flushed: 0,
            batches: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn next_batch_size(&self) -> usize {
        self.options.batching.batch_size(self.batches, self.flush.is_some())
    }

    /// Checked at every batch boundary.
    pub(crate) fn check_stop(&self) -> Option<Completion> {
        if self.cancel.is_cancelled() {
            return Some(Completion::Cancelled);
        }
        if self.options.count_limit.is_some_and(|limit| self.accepted >= limit) {
            return Some(Completion::LimitReached);
        }
        None
    }

    /// Filters, converts and buffers one record. Returns a completion when the listing must stop.
    pub(crate) fn accept(&mut self, record: RawRecord) -> Option<Completion> {
        if self.cancel.is_cancelled() {
            return Some(Completion::Cancelled);
        }
        if !self.options.visibility.accepts(&record) {
            return None;
        }
        self.buffer.push(convert_record(record, self.options.classifier.as_ref()));
        self.accepted += 1;
        self.accepted_in_batch += 1;
        if self.options.count_limit.is_some_and(|limit| self.accepted >= limit) {
            return Some(Completion::LimitReached);
        }
        None
    }

    /// Closes a batch read with `size` requested records, flushing the buffer if the batch
    /// accepted that many or the interval elapsed. Filtered records don't count.
    pub(crate) async fn end_batch(&mut self, size: usize) {
        self.batches += 1;
        let full = std::mem::take(&mut self.accepted_in_batch) >= size;
        let Some(flush) = self.flush.as_mut() else {
            return;
        };
        if self.buffer.is_empty() || !(full || self.sampler.check_now()) {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        self.flushed += batch.len();
        log::trace!(
            "end_batch: flushing {} entries (batch {}, total flushed {})",
            batch.len(),
            self.batches,
            self.flushed
        );
        flush(batch).await;
    }

    pub(crate) fn finish(self, completion: Completion, location: &str) -> ListingOutcome {
        log::debug!(
            "list_entries: location={}, completion={:?}, accepted={}, flushed={}, batches={}, total={}ms",
            location,
            completion,
            self.accepted,
            self.flushed,
            self.batches,
            self.started.elapsed().as_millis()
        );
        ListingOutcome {
            entries: self.buffer,
            flushed: self.flushed,
            completion,
        }
    }
}
