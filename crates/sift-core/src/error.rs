//! Error types for `sift-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::archive::ArchiveState;

#[derive(Debug, Error)]
pub enum Error {
  #[error("archive {archive_id} is already {state}")]
  ArchiveTerminal {
    archive_id: Uuid,
    state:      ArchiveState,
  },

  #[error("archive {0} has not been picked up for processing")]
  ArchiveNotStarted(Uuid),

  #[error("archive {0} is already being processed")]
  ArchiveClaimed(Uuid),

  #[error("cannot merge import request {0} into itself")]
  SelfMerge(Uuid),

  #[error("unknown secondary tag: {0:?}")]
  UnknownSecondaryTag(String),

  #[error("record properties must be a JSON object")]
  PropertiesNotObject,

  #[error("flush of {pending} records failed: {source}")]
  Flush {
    pending: usize,
    #[source]
    source:  Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
