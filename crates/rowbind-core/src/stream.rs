//! Streaming fill.
//!
//! A reader thread pulls rows off the cursor into a bounded queue. The
//! calling thread dispatches each row, tagged with its sequence position, to
//! a pool of decode workers and writes finished elements back by position,
//! so the destination keeps source order however the work interleaves. Only
//! the dispatching thread touches the destination; it alone grows the
//! sequence.
//!
//! Decode failures are per row: the failed element keeps its previous value
//! (the default for a growable list), a warning is logged and the stream
//! continues. Cursor errors are returned once every thread has joined.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{self as channel, Receiver, Sender};
use rowbind_error::{BindError, Result};
use tracing::{debug, warn};

use crate::config::BindConfig;
use crate::cursor::{Cursor, RawRow, close_after, open_result_set, read_current};
use crate::resolver::FieldResolver;
use crate::shape::{Destination, Element, RowContext, Slot, decode_fresh};

/// Job queue depth per decode worker.
pub const JOB_QUEUE_FACTOR: usize = 10;

// ---------------------------------------------------------------------------
// Reader side
// ---------------------------------------------------------------------------

fn produce<C: Cursor + ?Sized>(
    cursor: &mut C,
    width: usize,
    limit: Option<usize>,
    rows: Sender<RawRow>,
) -> Result<usize> {
    let mut sent = 0;
    loop {
        let row = read_current(cursor, width)?;
        if rows.send(row).is_err() {
            debug!(sent, "row consumer hung up");
            return Ok(sent);
        }
        sent += 1;
        if limit.is_some_and(|limit| sent >= limit) || !cursor.advance() {
            break;
        }
    }
    match cursor.last_error() {
        Some(err) => Err(BindError::Source(err)),
        None => Ok(sent),
    }
}

/// Join handle of a reader started by [`spawn_reader`].
#[derive(Debug)]
pub struct ReaderHandle {
    handle: Option<JoinHandle<Result<usize>>>,
}

impl ReaderHandle {
    /// Wait for the reader and return the number of rows it sent.
    pub fn join(self) -> Result<usize> {
        match self.handle {
            Some(handle) => handle.join().map_err(|_| BindError::WorkerPanicked)?,
            None => Ok(0),
        }
    }
}

/// Read `cursor` on a background thread.
///
/// Column names are read before returning. Rows arrive on the receiver,
/// which disconnects once the cursor is exhausted, `limit` rows were sent or
/// a read failed. The reader closes the cursor when it finishes.
pub fn spawn_reader<C>(
    mut cursor: C,
    limit: Option<usize>,
    queue_capacity: usize,
) -> Result<(Vec<String>, Receiver<RawRow>, ReaderHandle)>
where
    C: Cursor + Send + 'static,
{
    if queue_capacity == 0 {
        return Err(BindError::invalid_config("queue_capacity must be >= 1"));
    }
    let (tx, rx) = channel::bounded(queue_capacity);
    let opened = open_result_set(&mut cursor, limit);
    let columns = match close_after_error(&mut cursor, opened)? {
        Some(columns) => columns,
        None => {
            close_after(&mut cursor, Ok(()))?;
            return Ok((Vec::new(), rx, ReaderHandle { handle: None }));
        }
    };

    let width = columns.len();
    let handle = thread::Builder::new()
        .name("rowbind-reader".to_owned())
        .spawn(move || {
            let outcome = produce(&mut cursor, width, limit, tx);
            close_after(&mut cursor, outcome)
        })?;
    Ok((
        columns,
        rx,
        ReaderHandle {
            handle: Some(handle),
        },
    ))
}

fn close_after_error<C: Cursor + ?Sized, T>(cursor: &mut C, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => Ok(value),
        Err(err) => close_after(cursor, Err(err)),
    }
}

/// Stream `cursor` into `dest` with a scoped reader thread.
pub(crate) fn scan<C, D>(
    resolver: &FieldResolver,
    config: &BindConfig,
    cursor: &mut C,
    dest: &mut D,
    limit: Option<usize>,
    fan_out: usize,
) -> Result<usize>
where
    C: Cursor + Send + ?Sized,
    D: Destination,
{
    let Some(columns) = open_result_set(cursor, limit)? else {
        return Ok(0);
    };
    let width = columns.len();
    let (tx, rx) = channel::bounded(config.stream.queue_capacity);

    thread::scope(|scope| {
        let reader = thread::Builder::new()
            .name("rowbind-reader".to_owned())
            .spawn_scoped(scope, move || produce(cursor, width, limit, tx))?;
        let filled = consume(resolver, config, &columns, rx, dest, limit, fan_out);
        let produced = reader.join().map_err(|_| BindError::WorkerPanicked)?;
        let count = filled?;
        produced?;
        Ok(count)
    })
}

// ---------------------------------------------------------------------------
// Decode side
// ---------------------------------------------------------------------------

enum Sink<'a, E> {
    Array(&'a mut [E]),
    List(&'a mut Vec<E>),
}

impl<E: Element> Sink<'_, E> {
    fn has_room(&self, idx: usize) -> bool {
        match self {
            Self::Array(items) => idx < items.len(),
            Self::List(_) => true,
        }
    }

    /// Grow a list by doubling until `idx` is addressable.
    fn make_room(&mut self, idx: usize) {
        if let Self::List(items) = self {
            if idx >= items.len() {
                let grown = (items.len() * 2).max(idx + 1);
                items.resize_with(grown, E::default);
            }
        }
    }

    fn put(&mut self, idx: usize, decoded: Result<E>) {
        match decoded {
            Ok(value) => match self {
                Self::Array(items) => items[idx] = value,
                Self::List(items) => items[idx] = value,
            },
            Err(err) => warn!(row = idx, error = %err, "dropping row that failed to decode"),
        }
    }

    fn finish(self, count: usize) {
        if let Self::List(items) = self {
            items.truncate(count);
        }
    }
}

/// Drain `rows` into `dest`.
///
/// A single-row destination takes the first row and propagates its decode
/// error. Sequences decode inline for `fan_out <= 1` and on a worker pool
/// otherwise. A list is only replaced once the first row arrives, so an
/// empty stream leaves it as it was. `limit`, when the caller knows it, caps
/// the up-front reservation.
pub(crate) fn consume<D: Destination>(
    resolver: &FieldResolver,
    config: &BindConfig,
    columns: &[String],
    rows: Receiver<RawRow>,
    dest: &mut D,
    limit: Option<usize>,
    fan_out: usize,
) -> Result<usize> {
    if columns.is_empty() {
        return Ok(0);
    }
    let layout = <D::Elem as Element>::layout(resolver, columns);
    let ctx = RowContext {
        columns,
        layout: &layout,
        policy: config.parse_policy,
    };

    let (mut sink, first) = match dest.slot() {
        Slot::One(value) => {
            return match rows.recv() {
                Ok(row) => value.decode_row(&ctx, &row).map(|()| 1),
                Err(_) => Ok(0),
            };
        }
        Slot::Array(items) => (Sink::Array(items), None),
        Slot::List(items) => {
            let Ok(first) = rows.recv() else {
                return Ok(0);
            };
            items.clear();
            items.reserve(config.stream.initial_capacity.min(limit.unwrap_or(usize::MAX)));
            (Sink::List(items), Some(first))
        }
    };
    let pending = first.into_iter().chain(rows.iter());

    let workers = if fan_out > 1 {
        config.stream.workers_for(fan_out)
    } else {
        1
    };
    debug!(columns = columns.len(), workers, "streaming fill started");
    let count = if workers > 1 {
        decode_parallel(&ctx, pending, &mut sink, workers)?
    } else {
        decode_inline(&ctx, pending, &mut sink)
    };
    sink.finish(count);
    debug!(rows = count, "streaming fill finished");
    Ok(count)
}

fn decode_inline<E: Element>(
    ctx: &RowContext<'_>,
    mut rows: impl Iterator<Item = RawRow>,
    sink: &mut Sink<'_, E>,
) -> usize {
    let mut count = 0;
    while sink.has_room(count) {
        let Some(row) = rows.next() else {
            break;
        };
        sink.make_room(count);
        sink.put(count, decode_fresh(ctx, &row));
        count += 1;
    }
    count
}

fn decode_parallel<E: Element>(
    ctx: &RowContext<'_>,
    mut rows: impl Iterator<Item = RawRow>,
    sink: &mut Sink<'_, E>,
    workers: usize,
) -> Result<usize> {
    let (job_tx, job_rx) = channel::bounded::<(usize, RawRow)>(workers * JOB_QUEUE_FACTOR);
    let (done_tx, done_rx) = channel::unbounded::<(usize, Result<E>)>();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("rowbind-decode-{id}"))
                .spawn_scoped(scope, move || {
                    for (idx, row) in jobs {
                        if done.send((idx, decode_fresh(ctx, &row))).is_err() {
                            break;
                        }
                    }
                })?;
            handles.push(handle);
        }
        drop(job_rx);
        drop(done_tx);

        let mut count = 0;
        while sink.has_room(count) {
            let Some(row) = rows.next() else {
                break;
            };
            sink.make_room(count);
            if job_tx.send((count, row)).is_err() {
                break;
            }
            count += 1;
            for (idx, decoded) in done_rx.try_iter() {
                sink.put(idx, decoded);
            }
        }
        drop(job_tx);

        for (idx, decoded) in done_rx.iter() {
            sink.put(idx, decoded);
        }
        let mut panicked = 0_usize;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            warn!(panicked, "decode workers panicked");
            return Err(BindError::WorkerPanicked);
        }
        Ok(count)
    })
}
