//! Error types for archive extraction.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no extractor registered for service {0:?}")]
  UnknownService(String),

  #[error("archive error: {0}")]
  Archive(#[from] zip::result::ZipError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("missing field {0:?}")]
  MissingField(String),

  #[error("unexpected shape: expected {expected} at {field:?}")]
  UnexpectedShape {
    field:    String,
    expected: &'static str,
  },

  #[error("unparseable timestamp {0:?}")]
  Timestamp(String),

  #[error("unknown time zone {0:?}")]
  TimeZone(String),

  #[error("entry {entry}: {source}")]
  Entry {
    entry:  String,
    #[source]
    source: Box<Error>,
  },

  #[error(transparent)]
  Sanitize(#[from] sift_sanitize::Error),

  #[error(transparent)]
  Core(#[from] sift_core::Error),

  #[error("archive {0} not found")]
  ArchiveNotFound(Uuid),

  #[error("import request {0} not found")]
  RequestNotFound(Uuid),

  #[error("ledger error: {0}")]
  Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn ledger<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    Self::Ledger(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
