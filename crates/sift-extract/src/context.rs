//! Per-archive import context.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use sift_core::{buffer::BatchBuffer, engagement::Engagement, policy::InclusionPolicy, record::NewRecord};
use sift_sanitize::Sanitizer;

use crate::{
  Error, Result,
  timestamp::{self, TimestampFormat},
};

/// Counts reported once an archive has been imported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
  /// Records handed to the buffer, engagement events included.
  pub records:  usize,
  /// Candidates rejected by the inclusion policy.
  pub excluded: usize,
  pub flushes:  usize,
}

/// Everything an extractor needs while walking one archive: who the data
/// belongs to, how to sanitize it, whether to keep it, and where it goes.
pub struct ImportContext<'a> {
  subject_id: &'a str,
  sanitizer:  &'a Sanitizer,
  policy:     &'a dyn InclusionPolicy,
  buffer:     BatchBuffer<'a>,
  local:      Tz,
  summary:    ImportSummary,
}

impl<'a> ImportContext<'a> {
  pub fn new(
    subject_id: &'a str,
    sanitizer: &'a Sanitizer,
    policy: &'a dyn InclusionPolicy,
    buffer: BatchBuffer<'a>,
    local: Tz,
  ) -> Self {
    Self {
      subject_id,
      sanitizer,
      policy,
      buffer,
      local,
      summary: ImportSummary::default(),
    }
  }

  pub fn subject_id(&self) -> &'a str { self.subject_id }

  pub fn sanitizer(&self) -> &'a Sanitizer { self.sanitizer }

  pub fn local_zone(&self) -> Tz { self.local }

  /// Resolve `value` against `formats` in the deployment's zone.
  pub fn timestamp(&self, value: &Value, formats: &[TimestampFormat]) -> Result<DateTime<Utc>> {
    timestamp::resolve(value, formats, self.local)
  }

  pub fn timestamp_str(&self, value: &str, formats: &[TimestampFormat]) -> Result<DateTime<Utc>> {
    timestamp::resolve_str(value, formats, self.local)
  }

  /// Ask the inclusion policy about a candidate. Rejections are counted.
  pub fn include(&mut self, occurred_at: DateTime<Utc>, raw: &Value) -> bool {
    let keep = self.policy.should_include(self.subject_id, occurred_at, raw);
    if !keep {
      self.summary.excluded += 1;
    }
    keep
  }

  /// Queue a content record.
  pub fn emit(
    &mut self,
    generator_id: String,
    properties: Map<String, Value>,
    occurred_at: DateTime<Utc>,
  ) -> Result<()> {
    let record = NewRecord::new(generator_id, self.subject_id, properties, occurred_at);
    self.enqueue(record)
  }

  /// Queue a content record built from a JSON value, which must be an object.
  pub fn emit_value(
    &mut self,
    generator_id: String,
    properties: Value,
    occurred_at: DateTime<Utc>,
  ) -> Result<()> {
    let record = NewRecord::from_value(generator_id, self.subject_id, properties, occurred_at)?;
    self.enqueue(record)
  }

  /// Queue the engagement event that accompanies a content record.
  pub fn engage(&mut self, engagement: Engagement, occurred_at: DateTime<Utc>) -> Result<()> {
    let record = engagement.into_record(self.subject_id, occurred_at);
    self.enqueue(record)
  }

  fn enqueue(&mut self, record: NewRecord) -> Result<()> {
    self.buffer.enqueue(record, false)?;
    self.summary.records += 1;
    Ok(())
  }

  /// Flush whatever is still buffered and report what happened.
  pub fn finish(mut self) -> Result<ImportSummary, Error> {
    self.buffer.finish()?;
    self.summary.flushes = self.buffer.flushes();
    Ok(self.summary)
  }

  pub fn summary(&self) -> ImportSummary { self.summary }
}
