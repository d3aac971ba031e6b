//! Offset-based producer: reads the source batch by batch on the blocking pool.

use std::sync::Arc;

use super::sequential::drain_cursor;
use super::source::{EntrySource, RawRecord, SourceError};
use super::{Accumulator, CancellationFlag, Completion, IntermediateFlush, ListingOptions, ListingOutcome};

/// Lists the entries of `source`.
///
/// With `flush`, intermediate batches go to the callback and the returned entries are only
/// what was produced after the last flush. A recoverable batch read error (not found, access
/// denied, not implemented) switches to a sequential cursor that resumes at the same offset.
/// Any other error ends the listing with the partial result.
pub async fn list_entries(
    source: Arc<dyn EntrySource>,
    cancel: &CancellationFlag,
    options: &ListingOptions,
    flush: Option<IntermediateFlush<'_>>,
) -> ListingOutcome {
    let location = source.location();
    log::debug!(
        "list_entries: location={}, limit={:?}, observed={}",
        location,
        options.count_limit,
        flush.is_some()
    );

    let mut acc = Accumulator::new(options, cancel, flush);
    let mut offset = 0usize;

    let completion = 'read: loop {
        if let Some(stop) = acc.check_stop() {
            break stop;
        }
        let size = acc.next_batch_size();
        let records = match read_batch(&source, offset, size).await {
            Ok(records) => records,
            Err(err) if err.is_transient() => {
                log::warn!(
                    "list_entries: batch read at offset {} of {} failed ({}), continuing one record at a time",
                    offset,
                    location,
                    err
                );
                break fall_back_to_cursor(&source, offset, &mut acc).await;
            }
            Err(err) => {
                log::warn!("list_entries: batch read at offset {} of {} failed: {}", offset, location, err);
                break Completion::Interrupted(err);
            }
        };
        if records.is_empty() {
            break Completion::Exhausted;
        }

        offset += records.len();
        for record in records {
            if let Some(stop) = acc.accept(record) {
                break 'read stop;
            }
        }
        acc.end_batch(size).await;
    };

    acc.finish(completion, &location)
}

async fn read_batch(source: &Arc<dyn EntrySource>, offset: usize, count: usize) -> Result<Vec<RawRecord>, SourceError> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source.read_batch(offset, count))
        .await
        .unwrap_or_else(|e| Err(SourceError::Io(format!("Batch read task failed: {}", e))))
}

async fn fall_back_to_cursor(source: &Arc<dyn EntrySource>, offset: usize, acc: &mut Accumulator<'_, '_>) -> Completion {
    let opener = Arc::clone(source);
    let opened = tokio::task::spawn_blocking(move || opener.open_sequential())
        .await
        .unwrap_or_else(|e| Err(SourceError::Io(format!("Cursor open task failed: {}", e))));

    match opened {
        Ok(cursor) => drain_cursor(cursor, offset, acc).await,
        Err(err) => {
            log::warn!(
                "fall_back_to_cursor: could not open a cursor on {}: {}",
                source.location(),
                err
            );
            Completion::Interrupted(err)
        }
    }
}
