//! Uploaded archives and their processing state machine.
//!
//! ```text
//! uploaded ──begin──▶ processing ──complete(true)──▶ processed
//!                          └──────complete(false)──▶ skipped
//! ```
//!
//! `processed` and `skipped` are terminal. At most one of `processed_at` and
//! `skipped_at` is ever set. `started_at` is persisted by the ledger when a
//! worker claims the archive, so a second worker never begins it again.

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveState {
  Uploaded,
  Processing,
  Processed,
  Skipped,
}

impl ArchiveState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Processed | Self::Skipped)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Uploaded => "uploaded",
      Self::Processing => "processing",
      Self::Processed => "processed",
      Self::Skipped => "skipped",
    }
  }
}

impl fmt::Display for ArchiveState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One uploaded export file, bound to a request and a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedArchive {
  pub archive_id:   Uuid,
  pub request_id:   Uuid,
  pub service_id:   String,
  pub path:         PathBuf,
  pub uploaded_at:  DateTime<Utc>,
  pub processed_at: Option<DateTime<Utc>>,
  pub skipped_at:   Option<DateTime<Utc>>,
  /// When a worker claimed the archive; kept after completion.
  #[serde(default)]
  pub started_at:   Option<DateTime<Utc>>,
}

impl UploadedArchive {
  pub fn new(
    request_id: Uuid,
    service_id: impl Into<String>,
    path: impl Into<PathBuf>,
    uploaded_at: DateTime<Utc>,
  ) -> Self {
    Self {
      archive_id: Uuid::new_v4(),
      request_id,
      service_id: service_id.into(),
      path: path.into(),
      uploaded_at,
      processed_at: None,
      skipped_at: None,
      started_at: None,
    }
  }

  pub fn state(&self) -> ArchiveState {
    if self.processed_at.is_some() {
      ArchiveState::Processed
    } else if self.skipped_at.is_some() {
      ArchiveState::Skipped
    } else if self.started_at.is_some() {
      ArchiveState::Processing
    } else {
      ArchiveState::Uploaded
    }
  }

  /// `uploaded → processing`.
  pub fn begin(&mut self, now: DateTime<Utc>) -> Result<()> {
    match self.state() {
      ArchiveState::Uploaded => {}
      ArchiveState::Processing => return Err(Error::ArchiveClaimed(self.archive_id)),
      state => {
        return Err(Error::ArchiveTerminal {
          archive_id: self.archive_id,
          state,
        });
      }
    }
    self.started_at = Some(now);
    Ok(())
  }

  /// `processing → processed` on success, `processing → skipped` otherwise.
  pub fn complete(&mut self, success: bool, now: DateTime<Utc>) -> Result<ArchiveState> {
    match self.state() {
      ArchiveState::Processing => {}
      ArchiveState::Uploaded => return Err(Error::ArchiveNotStarted(self.archive_id)),
      state => {
        return Err(Error::ArchiveTerminal {
          archive_id: self.archive_id,
          state,
        });
      }
    }

    if success {
      self.processed_at = Some(now);
    } else {
      self.skipped_at = Some(now);
    }
    Ok(self.state())
  }
}
