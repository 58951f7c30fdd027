//! Folding one import request into another.

use anyhow::Context as _;
use sift_core::store::{ImportLedger, RecordStore};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
  pub archives: usize,
  pub records:  usize,
}

/// Merge request `source_id` into `destination_id` and delete the source.
///
/// The destination absorbs the source's services, missing extras and
/// uploads; the source subject's records are refiled under the
/// destination subject.
pub fn merge_requests<S>(store: &S, source_id: Uuid, destination_id: Uuid) -> anyhow::Result<MergeReport>
where
  S: RecordStore + ImportLedger,
{
  let source = store
    .get_request(source_id)?
    .with_context(|| format!("import request {source_id} not found"))?;
  let mut destination = store
    .get_request(destination_id)?
    .with_context(|| format!("import request {destination_id} not found"))?;

  destination.merge(&source)?;

  // Records move first; if the ledger step then fails, running the merge
  // again finds them already refiled.
  let records = if source.subject_id == destination.subject_id {
    0
  } else {
    store.reassign_subject(&source.subject_id, &destination.subject_id)?
  };
  let archives = store
    .absorb_request(source_id, &destination)
    .with_context(|| format!("failed to fold request {source_id} into {destination_id}"))?;

  info!(%source_id, %destination_id, archives, records, "import requests merged");
  Ok(MergeReport { archives, records })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::{Map, json};
  use sift_core::{
    archive::UploadedArchive,
    record::NewRecord,
    request::NewImportRequest,
    store::RecordQuery,
  };
  use sift_store_sqlite::SqliteStore;

  use super::*;

  fn request(store: &SqliteStore, subject: &str, service: &str) -> sift_core::request::ImportRequest {
    let mut input = NewImportRequest::new(subject, format!("{subject}@example.com"));
    input.services.insert(service.into());
    input.extras.insert("origin".into(), json!(subject));
    store.create_request(input).unwrap()
  }

  #[test]
  fn source_is_folded_into_destination() {
    let store = SqliteStore::open_in_memory().unwrap();
    let destination = request(&store, "dest", "facebook");
    let source = request(&store, "src", "twitter");

    let upload = UploadedArchive::new(source.request_id, "twitter", "/tmp/t.zip", Utc::now());
    store.add_archive(&upload).unwrap();
    store
      .bulk_insert(vec![
        NewRecord::new("pdk-external-twitter-tweet", "src", Map::new(), Utc::now()),
        NewRecord::new("pdk-external-twitter-like", "src", Map::new(), Utc::now()),
      ])
      .unwrap();

    let report = merge_requests(&store, source.request_id, destination.request_id).unwrap();
    assert_eq!(report, MergeReport { archives: 1, records: 2 });

    assert!(store.get_request(source.request_id).unwrap().is_none());
    let merged = store.get_request(destination.request_id).unwrap().unwrap();
    assert!(merged.services.contains("facebook"));
    assert!(merged.services.contains("twitter"));
    assert_eq!(merged.extras["origin"], "dest");
    assert_eq!(store.get_request_by_token(&merged.token).unwrap().unwrap().request_id, destination.request_id);

    let archives = store.archives_for_request(destination.request_id).unwrap();
    assert_eq!(archives[0].archive_id, upload.archive_id);
    assert_eq!(store.count_records(&RecordQuery::for_subject("dest")).unwrap(), 2);
    assert!(!merged.completed(&archives));
  }

  #[test]
  fn merging_into_itself_fails_without_changes() {
    let store = SqliteStore::open_in_memory().unwrap();
    let only = request(&store, "solo", "facebook");

    assert!(merge_requests(&store, only.request_id, only.request_id).is_err());
    assert!(store.get_request(only.request_id).unwrap().is_some());
  }

  #[test]
  fn unknown_requests_are_reported() {
    let store = SqliteStore::open_in_memory().unwrap();
    let only = request(&store, "solo", "facebook");
    assert!(merge_requests(&store, Uuid::new_v4(), only.request_id).is_err());
  }
}
