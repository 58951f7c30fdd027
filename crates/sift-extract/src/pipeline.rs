//! Uploaded-archive processing.
//!
//! Drives one archive through `uploaded → processing → processed | skipped`,
//! importing it with a fresh batch buffer. The `processing` step is a claim
//! recorded in the ledger before any record is written, so an archive that
//! is finished or already claimed by another worker is a logged no-op.

use std::path::Path;

use chrono::Utc;
use chrono_tz::Tz;
use sift_core::{
  archive::{ArchiveState, UploadedArchive},
  buffer::{BatchBuffer, DEFAULT_CAPACITY},
  policy::{IncludeAll, InclusionPolicy},
  store::{ImportLedger, RecordSink},
};
use sift_sanitize::Sanitizer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{Error, ImportContext, ImportSummary, Registry, Result};

/// What one call to [`Pipeline::attempt`] did with an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
  Processed,
  Skipped,
  /// Finished earlier or claimed by another worker; nothing was written.
  NotClaimed,
}

pub struct Pipeline<'a> {
  registry:       &'a Registry,
  sanitizer:      &'a Sanitizer,
  policy:         &'a dyn InclusionPolicy,
  local:          Tz,
  batch_capacity: usize,
}

impl<'a> Pipeline<'a> {
  pub fn new(registry: &'a Registry, sanitizer: &'a Sanitizer) -> Self {
    Self {
      registry,
      sanitizer,
      policy: &IncludeAll,
      local: Tz::UTC,
      batch_capacity: DEFAULT_CAPACITY,
    }
  }

  pub fn with_policy(mut self, policy: &'a dyn InclusionPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_time_zone(mut self, local: Tz) -> Self {
    self.local = local;
    self
  }

  pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
    self.batch_capacity = capacity;
    self
  }

  /// Import one file for `subject_id` without touching the ledger.
  pub fn import_file(
    &self,
    sink: &dyn RecordSink,
    service_id: &str,
    subject_id: &str,
    path: &Path,
  ) -> Result<ImportSummary> {
    let extractor = self
      .registry
      .get(service_id)
      .ok_or_else(|| Error::UnknownService(service_id.to_owned()))?;

    let buffer = BatchBuffer::new(sink, self.batch_capacity);
    let mut ctx = ImportContext::new(subject_id, self.sanitizer, self.policy, buffer, self.local);

    info!(service = service_id, path = %path.display(), "importing archive");
    extractor.import(&mut ctx, path)?;
    ctx.finish()
  }

  /// Process the uploaded archive `archive_id`. Returns `true` only when
  /// this call imported it successfully.
  pub fn process<L: ImportLedger>(&self, ledger: &L, sink: &dyn RecordSink, archive_id: Uuid) -> bool {
    self.attempt(ledger, sink, archive_id) == Attempt::Processed
  }

  /// Like [`Pipeline::process`], but tells a skipped import apart from an
  /// archive this call never claimed.
  pub fn attempt<L: ImportLedger>(&self, ledger: &L, sink: &dyn RecordSink, archive_id: Uuid) -> Attempt {
    match self.try_process(ledger, sink, archive_id) {
      Ok(attempt) => attempt,
      Err(e) => {
        error!(%archive_id, error = %e, "archive bookkeeping failed");
        Attempt::Skipped
      }
    }
  }

  fn try_process<L: ImportLedger>(&self, ledger: &L, sink: &dyn RecordSink, archive_id: Uuid) -> Result<Attempt> {
    let mut archive = ledger
      .get_archive(archive_id)
      .map_err(Error::ledger)?
      .ok_or(Error::ArchiveNotFound(archive_id))?;

    let state = archive.state();
    if state != ArchiveState::Uploaded {
      info!(%archive_id, %state, "archive already claimed or finished");
      return Ok(Attempt::NotClaimed);
    }

    let started = Utc::now();
    archive.begin(started)?;
    if !ledger.claim_archive(archive_id, started).map_err(Error::ledger)? {
      info!(%archive_id, "archive claimed by another worker");
      return Ok(Attempt::NotClaimed);
    }

    let outcome = self.run(ledger, sink, &archive);

    let success = match &outcome {
      Ok(summary) => {
        info!(
          %archive_id,
          service = %archive.service_id,
          records = summary.records,
          excluded = summary.excluded,
          flushes = summary.flushes,
          "archive processed"
        );
        true
      }
      Err(e) => {
        error!(%archive_id, service = %archive.service_id, error = %e, "archive skipped");
        false
      }
    };

    let now = Utc::now();
    let attempt = match archive.complete(success, now)? {
      ArchiveState::Processed => {
        ledger.mark_processed(archive_id, now).map_err(Error::ledger)?;
        Attempt::Processed
      }
      _ => {
        ledger.mark_skipped(archive_id, now).map_err(Error::ledger)?;
        Attempt::Skipped
      }
    };
    Ok(attempt)
  }

  fn run<L: ImportLedger>(&self, ledger: &L, sink: &dyn RecordSink, archive: &UploadedArchive) -> Result<ImportSummary> {
    let request = ledger
      .get_request(archive.request_id)
      .map_err(Error::ledger)?
      .ok_or(Error::RequestNotFound(archive.request_id))?;

    self.import_file(sink, &archive.service_id, &request.subject_id, &archive.path)
  }
}
