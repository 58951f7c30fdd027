//! Storage traits and supporting query types.
//!
//! The traits are implemented by storage backends (e.g. `sift-store-sqlite`).
//! The pipeline depends on these abstractions, not on a concrete backend.
//!
//! All operations are blocking; archive processing never suspends. Backends
//! must tolerate concurrent callers because several archive jobs may flush
//! at once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  archive::UploadedArchive,
  record::{NewRecord, Record},
  request::{ImportRequest, NewImportRequest},
  service::ServiceDefinition,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`RecordStore::list_records`] and
/// [`RecordStore::count_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
  pub subject_id:       Option<String>,
  /// Exact generator id match.
  pub generator_id:     Option<String>,
  /// Generator id prefix match, e.g. `pdk-external-engagement-`.
  pub generator_prefix: Option<String>,
  pub occurred_after:   Option<DateTime<Utc>>,
  pub occurred_before:  Option<DateTime<Utc>>,
  pub limit:            Option<usize>,
  pub offset:           Option<usize>,
}

impl RecordQuery {
  pub fn for_subject(subject_id: impl Into<String>) -> Self {
    Self {
      subject_id: Some(subject_id.into()),
      ..Self::default()
    }
  }

  pub fn generator(mut self, generator_id: impl Into<String>) -> Self {
    self.generator_id = Some(generator_id.into());
    self
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Durable home of normalized records.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a single record and return it with its store-assigned fields.
  fn create(&self, record: NewRecord) -> Result<Record, Self::Error>;

  /// Persist many records in one operation, in order. Returns the number
  /// written.
  fn bulk_insert(&self, records: Vec<NewRecord>) -> Result<usize, Self::Error>;

  /// Records matching `query`, ordered by `occurred_at`.
  fn list_records(&self, query: &RecordQuery) -> Result<Vec<Record>, Self::Error>;

  fn count_records(&self, query: &RecordQuery) -> Result<usize, Self::Error>;

  /// Move every record filed under `from` to `to`. Used when two import
  /// requests are merged. Returns the number of records moved.
  fn reassign_subject(&self, from: &str, to: &str) -> Result<usize, Self::Error>;
}

/// Object-safe write side of a [`RecordStore`], used by the batch buffer so
/// extractors don't need to be generic over the backend.
pub trait RecordSink {
  fn write_batch(
    &self,
    records: Vec<NewRecord>,
  ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

impl<S: RecordStore> RecordSink for S {
  fn write_batch(
    &self,
    records: Vec<NewRecord>,
  ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    self.bulk_insert(records).map_err(Into::into)
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Bookkeeping for services, import requests and uploaded archives.
pub trait ImportLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Services ──────────────────────────────────────────────────────────

  /// Insert or replace a service definition keyed by its id.
  fn upsert_service(&self, service: &ServiceDefinition) -> Result<(), Self::Error>;

  /// All known services ordered by priority.
  fn list_services(&self) -> Result<Vec<ServiceDefinition>, Self::Error>;

  // ── Requests ──────────────────────────────────────────────────────────

  fn create_request(&self, input: NewImportRequest) -> Result<ImportRequest, Self::Error>;

  fn get_request(&self, id: Uuid) -> Result<Option<ImportRequest>, Self::Error>;

  fn get_request_by_token(&self, token: &str) -> Result<Option<ImportRequest>, Self::Error>;

  /// Overwrite the mutable fields of an existing request.
  fn update_request(&self, request: &ImportRequest) -> Result<(), Self::Error>;

  /// Delete a request together with its archives.
  fn delete_request(&self, id: Uuid) -> Result<(), Self::Error>;

  /// In one step: re-parent every archive of `source_id` onto
  /// `destination`, delete the source request and store `destination`.
  /// Returns the number of archives moved. Nothing changes on error.
  fn absorb_request(&self, source_id: Uuid, destination: &ImportRequest) -> Result<usize, Self::Error>;

  // ── Archives ──────────────────────────────────────────────────────────

  fn add_archive(&self, archive: &UploadedArchive) -> Result<(), Self::Error>;

  fn get_archive(&self, id: Uuid) -> Result<Option<UploadedArchive>, Self::Error>;

  /// Unclaimed archives with neither `processed_at` nor `skipped_at`,
  /// oldest first.
  fn pending_archives(&self) -> Result<Vec<UploadedArchive>, Self::Error>;

  fn archives_for_request(&self, request_id: Uuid) -> Result<Vec<UploadedArchive>, Self::Error>;

  /// Re-parent an archive onto another request.
  fn move_archive(&self, archive_id: Uuid, request_id: Uuid) -> Result<(), Self::Error>;

  /// Atomically set `started_at` on an unclaimed, unfinished archive.
  /// `Ok(false)` means another worker got there first or the archive is
  /// already finished.
  fn claim_archive(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<bool, Self::Error>;

  /// Mark skipped every archive claimed before `started_before` that never
  /// finished, returning their ids.
  fn skip_abandoned(
    &self,
    started_before: DateTime<Utc>,
    at: DateTime<Utc>,
  ) -> Result<Vec<Uuid>, Self::Error>;

  fn mark_processed(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<(), Self::Error>;

  fn mark_skipped(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<(), Self::Error>;

  fn update_archive_path(&self, archive_id: Uuid, path: &std::path::Path) -> Result<(), Self::Error>;
}
