//! Concurrent processing of pending uploads.
//!
//! Each archive runs as its own blocking task. At most `workers` run at a
//! time; they share the store and the [`Runtime`], but every job gets a
//! fresh pipeline and batch buffer. Claims left behind by a run that died
//! are released as skipped before any new work starts.

use std::{
  panic::{self, AssertUnwindSafe},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;
use sift_core::store::ImportLedger;
use sift_extract::Attempt;
use sift_sanitize::crypto::SealingKey;
use sift_store_sqlite::SqliteStore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{Runtime, files};

/// Per-run tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
  pub processed:   usize,
  pub skipped:     usize,
  /// Claimed by someone else between listing and starting.
  pub passed_over: usize,
  /// Stale claims from an earlier run, now skipped.
  pub abandoned:   usize,
}

impl Outcome {
  fn record(&mut self, joined: Result<Attempt, JoinError>) {
    match joined {
      Ok(Attempt::Processed) => self.processed += 1,
      Ok(Attempt::Skipped) => self.skipped += 1,
      Ok(Attempt::NotClaimed) => self.passed_over += 1,
      Err(e) => {
        error!(error = %e, "archive job did not complete");
        self.skipped += 1;
      }
    }
  }
}

/// Process every pending upload, oldest first.
pub async fn process_pending(
  store: Arc<SqliteStore>,
  runtime: Arc<Runtime>,
  workers: usize,
) -> anyhow::Result<Outcome> {
  let mut outcome = Outcome::default();

  let now = Utc::now();
  let abandoned = store
    .skip_abandoned(now - runtime.claim_timeout, now)
    .context("failed to release abandoned uploads")?;
  for &archive_id in &abandoned {
    warn!(%archive_id, "upload was abandoned mid-import; marked skipped");
    seal_if_configured(&store, &runtime, archive_id);
  }
  outcome.abandoned = abandoned.len();

  let pending = store
    .pending_archives()
    .context("failed to list pending uploads")?;
  let workers = workers.max(1);
  info!(pending = pending.len(), workers, "processing uploads");

  let mut jobs = JoinSet::new();

  for archive in pending {
    while jobs.len() >= workers {
      if let Some(joined) = jobs.join_next().await {
        outcome.record(joined);
      }
    }

    let store = Arc::clone(&store);
    let runtime = Arc::clone(&runtime);
    jobs.spawn_blocking(move || run_job(&store, &runtime, archive.archive_id));
  }

  while let Some(joined) = jobs.join_next().await {
    outcome.record(joined);
  }

  info!(
    processed = outcome.processed,
    skipped = outcome.skipped,
    passed_over = outcome.passed_over,
    abandoned = outcome.abandoned,
    "uploads handled"
  );
  Ok(outcome)
}

/// Import one archive. A panicking extractor marks the archive skipped.
/// Uploads this job never claimed are left for their owner to seal.
fn run_job(store: &SqliteStore, runtime: &Runtime, archive_id: Uuid) -> Attempt {
  let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
    runtime.pipeline().attempt(store, store, archive_id)
  }));

  let attempt = match attempt {
    Ok(attempt) => attempt,
    Err(_) => {
      error!(%archive_id, "archive job panicked");
      if let Err(e) = store.mark_skipped(archive_id, Utc::now()) {
        error!(%archive_id, error = %e, "failed to mark archive skipped");
      }
      Attempt::Skipped
    }
  };

  if attempt != Attempt::NotClaimed {
    seal_if_configured(store, runtime, archive_id);
  }
  attempt
}

fn seal_if_configured(store: &SqliteStore, runtime: &Runtime, archive_id: Uuid) {
  if let Some(key) = &runtime.upload_key
    && let Err(e) = seal_stored_upload(store, key, archive_id)
  {
    warn!(%archive_id, error = %e, "upload left unsealed");
  }
}

fn seal_stored_upload(store: &SqliteStore, key: &SealingKey, archive_id: Uuid) -> anyhow::Result<()> {
  let archive = store
    .get_archive(archive_id)?
    .with_context(|| format!("archive {archive_id} disappeared"))?;
  let sealed = files::seal_upload(key, &archive.path)?;
  store.update_archive_path(archive_id, &sealed)?;
  info!(%archive_id, path = %sealed.display(), "upload sealed");
  Ok(())
}
