//! Cursor-based producer: pulls records one at a time, in chunks sized like batches.

use super::source::{RawRecord, RecordCursor, SourceError};
use super::{Accumulator, CancellationFlag, Completion, IntermediateFlush, ListingOptions, ListingOutcome};

/// Lists the entries behind `cursor`, with the same batching, flushing and stop rules as
/// [`list_entries`](super::batched::list_entries).
///
/// Records the cursor fails to read with a recoverable error are skipped. Any other error ends
/// the listing with the partial result.
pub async fn list_entries_from_cursor(
    cursor: Box<dyn RecordCursor>,
    cancel: &CancellationFlag,
    options: &ListingOptions,
    flush: Option<IntermediateFlush<'_>>,
) -> ListingOutcome {
    let mut acc = Accumulator::new(options, cancel, flush);
    let completion = drain_cursor(cursor, 0, &mut acc).await;
    acc.finish(completion, "cursor")
}

/// One blocking read's worth of records.
struct Chunk {
    records: Vec<RawRecord>,
    failure: Option<SourceError>,
    exhausted: bool,
}

/// Feeds the cursor into `acc` until it ends or the listing stops, skipping the first `skip`
/// records (already consumed by batched reads).
pub(crate) async fn drain_cursor(
    mut cursor: Box<dyn RecordCursor>,
    mut skip: usize,
    acc: &mut Accumulator<'_, '_>,
) -> Completion {
    loop {
        if let Some(stop) = acc.check_stop() {
            return stop;
        }
        let size = acc.next_batch_size();
        let read = tokio::task::spawn_blocking(move || {
            let chunk = read_chunk(cursor.as_mut(), &mut skip, size);
            (cursor, skip, chunk)
        })
        .await;
        let chunk = match read {
            Ok((returned, remaining_skip, chunk)) => {
                cursor = returned;
                skip = remaining_skip;
                chunk
            }
            Err(e) => {
                log::warn!("drain_cursor: read task failed: {}", e);
                return Completion::Interrupted(SourceError::Io(format!("Cursor read task failed: {}", e)));
            }
        };

        for record in chunk.records {
            if let Some(stop) = acc.accept(record) {
                return stop;
            }
        }
        if let Some(err) = chunk.failure {
            log::warn!("drain_cursor: stopping after unrecoverable read error: {}", err);
            return Completion::Interrupted(err);
        }
        acc.end_batch(size).await;
        if chunk.exhausted {
            return Completion::Exhausted;
        }
    }
}

fn read_chunk(cursor: &mut dyn RecordCursor, skip: &mut usize, size: usize) -> Chunk {
    let mut records = Vec::with_capacity(size);
    while records.len() < size {
        match cursor.next_record() {
            None => {
                return Chunk {
                    records,
                    failure: None,
                    exhausted: true,
                };
            }
            Some(Ok(_)) if *skip > 0 => *skip -= 1,
            Some(Ok(record)) => records.push(record),
            Some(Err(err)) if err.is_transient() => {
                log::debug!("read_chunk: skipping unreadable record: {}", err);
            }
            Some(Err(err)) => {
                return Chunk {
                    records,
                    failure: Some(err),
                    exhausted: false,
                };
            }
        }
    }
    Chunk {
        records,
        failure: None,
        exhausted: false,
    }
}
