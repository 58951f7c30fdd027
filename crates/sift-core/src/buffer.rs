//! Batch insert buffer.
//!
//! One buffer is built per archive job and dropped when the job ends. It is
//! deliberately `!Sync`: concurrent jobs each own their own buffer and share
//! only the underlying store.

use std::{cell::Cell, marker::PhantomData};

use tracing::debug;

use crate::{Error, Result, record::NewRecord, store::RecordSink};

/// Number of records held before an automatic flush.
pub const DEFAULT_CAPACITY: usize = 1000;

pub struct BatchBuffer<'a> {
  sink:     &'a dyn RecordSink,
  pending:  Vec<NewRecord>,
  capacity: usize,
  flushes:  usize,
  written:  usize,
  _not_sync: PhantomData<Cell<()>>,
}

impl<'a> BatchBuffer<'a> {
  pub fn new(sink: &'a dyn RecordSink, capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      sink,
      pending: Vec::with_capacity(capacity),
      capacity,
      flushes: 0,
      written: 0,
      _not_sync: PhantomData,
    }
  }

  pub fn with_default_capacity(sink: &'a dyn RecordSink) -> Self {
    Self::new(sink, DEFAULT_CAPACITY)
  }

  /// Append `record`; flush when the buffer is full or `force_flush` is set.
  pub fn enqueue(&mut self, record: NewRecord, force_flush: bool) -> Result<()> {
    self.pending.push(record);
    if force_flush || self.pending.len() >= self.capacity {
      self.flush()?;
    }
    Ok(())
  }

  /// Persist everything still pending.
  pub fn finish(&mut self) -> Result<()> {
    if self.pending.is_empty() {
      return Ok(());
    }
    self.flush()
  }

  /// Write all pending records in one bulk operation. On failure the pending
  /// batch is discarded.
  fn flush(&mut self) -> Result<()> {
    let batch = std::mem::take(&mut self.pending);
    let pending = batch.len();

    let written = self
      .sink
      .write_batch(batch)
      .map_err(|source| Error::Flush { pending, source })?;

    self.flushes += 1;
    self.written += written;
    debug!(records = written, flush = self.flushes, "flushed record batch");
    Ok(())
  }

  pub fn pending(&self) -> usize { self.pending.len() }

  pub fn flushes(&self) -> usize { self.flushes }

  pub fn written(&self) -> usize { self.written }

  pub fn capacity(&self) -> usize { self.capacity }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use chrono::{TimeZone, Utc};
  use serde_json::Map;

  use super::*;

  #[derive(Default)]
  struct CountingSink {
    batches: RefCell<Vec<usize>>,
    fail:    bool,
  }

  impl RecordSink for CountingSink {
    fn write_batch(
      &self,
      records: Vec<NewRecord>,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
      if self.fail {
        return Err("disk full".into());
      }
      self.batches.borrow_mut().push(records.len());
      Ok(records.len())
    }
  }

  fn record(i: i64) -> NewRecord {
    NewRecord::new(
      "pdk-external-test-item",
      "subject",
      Map::new(),
      Utc.timestamp_opt(i, 0).unwrap(),
    )
  }

  #[test]
  fn flushes_at_capacity_and_on_finish() {
    let sink = CountingSink::default();
    let mut buffer = BatchBuffer::new(&sink, 1000);

    for i in 0..2500 {
      buffer.enqueue(record(i), false).unwrap();
    }
    assert_eq!(*sink.batches.borrow(), vec![1000, 1000]);
    assert_eq!(buffer.pending(), 500);

    buffer.finish().unwrap();
    assert_eq!(*sink.batches.borrow(), vec![1000, 1000, 500]);
    assert_eq!(buffer.written(), 2500);
    assert_eq!(buffer.flushes(), 3);
  }

  #[test]
  fn force_flush_writes_immediately() {
    let sink = CountingSink::default();
    let mut buffer = BatchBuffer::new(&sink, 1000);

    buffer.enqueue(record(1), false).unwrap();
    buffer.enqueue(record(2), true).unwrap();
    assert_eq!(*sink.batches.borrow(), vec![2]);
    assert_eq!(buffer.pending(), 0);
  }

  #[test]
  fn finish_on_empty_buffer_is_a_no_op() {
    let sink = CountingSink::default();
    let mut buffer = BatchBuffer::with_default_capacity(&sink);
    buffer.finish().unwrap();
    assert!(sink.batches.borrow().is_empty());
    assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
  }

  #[test]
  fn failed_flush_drops_the_batch() {
    let sink = CountingSink { fail: true, ..Default::default() };
    let mut buffer = BatchBuffer::new(&sink, 2);

    buffer.enqueue(record(1), false).unwrap();
    let err = buffer.enqueue(record(2), false).unwrap_err();
    assert!(matches!(err, Error::Flush { pending: 2, .. }));
    assert_eq!(buffer.pending(), 0);
    assert_eq!(buffer.written(), 0);
  }
}
