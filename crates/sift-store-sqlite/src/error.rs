//! Error type for `sift-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sift_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown archive extension: {0:?}")]
  ArchiveExtension(String),

  #[error("import request not found: {0}")]
  RequestNotFound(uuid::Uuid),

  #[error("uploaded archive not found: {0}")]
  ArchiveNotFound(uuid::Uuid),

  #[error("archive {0} is already processed or skipped")]
  ArchiveFinished(uuid::Uuid),

  /// A thread panicked while holding the connection.
  #[error("connection lock poisoned")]
  Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
