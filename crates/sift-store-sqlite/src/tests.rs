//! Integration tests for `SqliteStore` against an in-memory database.

use std::{path::Path, sync::Arc, thread};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use sift_core::{
  archive::{ArchiveState, UploadedArchive},
  record::{NewRecord, SecondaryTag},
  request::NewImportRequest,
  service::{ArchiveExtension, ServiceDefinition},
  store::{ImportLedger, RecordQuery, RecordStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

fn store() -> SqliteStore { SqliteStore::open_in_memory().expect("in-memory store") }

fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap() }

fn record(subject: &str, generator: &str, secs: i64) -> NewRecord {
  let mut properties = serde_json::Map::new();
  properties.insert("n".into(), json!(secs));
  NewRecord::new(generator, subject, properties, at(secs))
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[test]
fn create_assigns_id_and_ingest_time() {
  let s = store();
  let before = Utc::now();
  let created = s
    .create(record("alice", "pdk-external-facebook-post", 0).with_tag(SecondaryTag::Active))
    .unwrap();
  assert!(created.ingested_at >= before);

  let listed = s.list_records(&RecordQuery::for_subject("alice")).unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].record_id, created.record_id);
  assert_eq!(listed[0].secondary_tag, Some(SecondaryTag::Active));
  assert_eq!(listed[0].properties["n"], 0);
  assert_eq!(listed[0].occurred_at, at(0));
}

#[test]
fn bulk_insert_preserves_every_record() {
  let s = store();
  let batch: Vec<_> = (0..250)
    .map(|i| record("alice", "pdk-external-twitter-tweet", i))
    .collect();

  assert_eq!(s.bulk_insert(batch).unwrap(), 250);
  assert_eq!(s.bulk_insert(vec![]).unwrap(), 0);
  assert_eq!(s.count_records(&RecordQuery::default()).unwrap(), 250);
}

#[test]
fn list_records_orders_by_occurrence() {
  let s = store();
  s.bulk_insert(vec![
    record("alice", "pdk-external-youtube-watch", 30),
    record("alice", "pdk-external-youtube-watch", 10),
    record("alice", "pdk-external-youtube-watch", 20),
  ])
  .unwrap();

  let times: Vec<_> = s
    .list_records(&RecordQuery::for_subject("alice"))
    .unwrap()
    .into_iter()
    .map(|r| r.occurred_at)
    .collect();
  assert_eq!(times, vec![at(10), at(20), at(30)]);
}

#[test]
fn record_query_filters_combine() {
  let s = store();
  s.bulk_insert(vec![
    record("alice", "pdk-external-facebook-post", 0),
    record("alice", "pdk-external-engagement-facebook", 0),
    record("alice", "pdk-external-engagement-twitter", 100),
    record("bob", "pdk-external-engagement-facebook", 50),
  ])
  .unwrap();

  let alice_posts = RecordQuery::for_subject("alice").generator("pdk-external-facebook-post");
  assert_eq!(s.count_records(&alice_posts).unwrap(), 1);

  let engagement = RecordQuery {
    generator_prefix: Some("pdk-external-engagement-".into()),
    ..RecordQuery::default()
  };
  assert_eq!(s.count_records(&engagement).unwrap(), 3);

  let windowed = RecordQuery {
    occurred_after: Some(at(10)),
    occurred_before: Some(at(100)),
    ..engagement.clone()
  };
  let hits = s.list_records(&windowed).unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].subject_id, "bob");
}

#[test]
fn generator_prefix_is_not_a_like_pattern() {
  let s = store();
  s.create(record("alice", "pdk-external-engagement-facebook", 0)).unwrap();

  let query = RecordQuery {
    generator_prefix: Some("pdk_external%".into()),
    ..RecordQuery::default()
  };
  assert_eq!(s.count_records(&query).unwrap(), 0);
}

#[test]
fn limit_and_offset_page_through_results() {
  let s = store();
  s.bulk_insert((0..5).map(|i| record("alice", "g", i)).collect()).unwrap();

  let page = RecordQuery {
    limit: Some(2),
    offset: Some(2),
    ..RecordQuery::for_subject("alice")
  };
  let times: Vec<_> = s.list_records(&page).unwrap().into_iter().map(|r| r.occurred_at).collect();
  assert_eq!(times, vec![at(2), at(3)]);
}

#[test]
fn reassign_subject_moves_records() {
  let s = store();
  s.bulk_insert(vec![record("old", "g", 0), record("old", "g", 1), record("other", "g", 2)])
    .unwrap();

  assert_eq!(s.reassign_subject("old", "new").unwrap(), 2);
  assert_eq!(s.count_records(&RecordQuery::for_subject("old")).unwrap(), 0);
  assert_eq!(s.count_records(&RecordQuery::for_subject("new")).unwrap(), 2);
}

#[test]
fn concurrent_writers_share_one_store() {
  let s = Arc::new(store());
  let handles: Vec<_> = (0..4)
    .map(|worker| {
      let s = Arc::clone(&s);
      thread::spawn(move || {
        let batch = (0..100).map(|i| record(&format!("w{worker}"), "g", i)).collect();
        s.bulk_insert(batch).unwrap()
      })
    })
    .collect();

  let written: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
  assert_eq!(written, 400);
  assert_eq!(s.count_records(&RecordQuery::default()).unwrap(), 400);
}

#[test]
fn file_store_persists_across_opens() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("sift.db");

  SqliteStore::open(&path).unwrap().create(record("alice", "g", 0)).unwrap();
  let reopened = SqliteStore::open(&path).unwrap();
  assert_eq!(reopened.count_records(&RecordQuery::default()).unwrap(), 1);
}

// ─── Services ────────────────────────────────────────────────────────────────

#[test]
fn services_upsert_and_sort_by_priority() {
  let s = store();
  for service in ServiceDefinition::builtin().into_iter().rev() {
    s.upsert_service(&service).unwrap();
  }
  s.upsert_service(&ServiceDefinition::new("facebook", "Meta", 20, ArchiveExtension::Zip))
    .unwrap();

  let services = s.list_services().unwrap();
  assert_eq!(services.len(), ServiceDefinition::builtin().len());
  assert_eq!(services[0].id, "instagram");
  let facebook = services.iter().find(|s| s.id == "facebook").unwrap();
  assert_eq!(facebook.name, "Meta");
  let amazon = services.iter().find(|s| s.id == "amazon").unwrap();
  assert_eq!(amazon.archive_extension, ArchiveExtension::Csv);
}

// ─── Requests ────────────────────────────────────────────────────────────────

fn new_request(subject: &str) -> NewImportRequest {
  let mut input = NewImportRequest::new(subject, format!("{subject}@example.com"));
  input.services.insert("facebook".into());
  input.extras.insert("cohort".into(), json!("pilot"));
  input
}

#[test]
fn create_and_fetch_request() {
  let s = store();
  let created = s.create_request(new_request("alice")).unwrap();

  let by_id = s.get_request(created.request_id).unwrap().unwrap();
  assert_eq!(by_id, created);

  let by_token = s.get_request_by_token(&created.token).unwrap().unwrap();
  assert_eq!(by_token.request_id, created.request_id);
  assert!(by_token.services.contains("facebook"));
  assert_eq!(by_token.extras["cohort"], "pilot");
}

#[test]
fn missing_requests_return_none() {
  let s = store();
  assert!(s.get_request(Uuid::new_v4()).unwrap().is_none());
  assert!(s.get_request_by_token("nope").unwrap().is_none());
}

#[test]
fn update_request_overwrites_mutable_fields() {
  let s = store();
  let mut request = s.create_request(new_request("alice")).unwrap();
  request.email = "new@example.com".into();
  request.can_email = false;
  request.last_emailed = Some(at(5));
  request.services.insert("tumblr".into());
  s.update_request(&request).unwrap();

  assert_eq!(s.get_request(request.request_id).unwrap().unwrap(), request);
}

#[test]
fn update_unknown_request_fails() {
  let s = store();
  let ghost = new_request("ghost").into_request(Utc::now());
  assert!(matches!(s.update_request(&ghost), Err(Error::RequestNotFound(_))));
}

#[test]
fn deleting_a_request_cascades_to_archives() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  s.delete_request(request.request_id).unwrap();
  assert!(s.get_request(request.request_id).unwrap().is_none());
  assert!(s.get_archive(archive.archive_id).unwrap().is_none());
  assert!(matches!(s.delete_request(request.request_id), Err(Error::RequestNotFound(_))));
}

#[test]
fn absorbing_moves_archives_and_drops_the_source() {
  let s = store();
  let source = s.create_request(new_request("alice")).unwrap();
  let mut destination = s.create_request(new_request("alice-2")).unwrap();
  let archive = UploadedArchive::new(source.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  destination.token = source.token.clone();
  assert_eq!(s.absorb_request(source.request_id, &destination).unwrap(), 1);

  assert!(s.get_request(source.request_id).unwrap().is_none());
  assert_eq!(s.get_request_by_token(&source.token).unwrap().unwrap().request_id, destination.request_id);
  assert_eq!(s.archives_for_request(destination.request_id).unwrap()[0].archive_id, archive.archive_id);
}

#[test]
fn failed_absorb_changes_nothing() {
  let s = store();
  let source = s.create_request(new_request("alice")).unwrap();
  let unsaved = new_request("ghost").into_request(at(0));

  assert!(matches!(
    s.absorb_request(source.request_id, &unsaved),
    Err(Error::RequestNotFound(id)) if id == unsaved.request_id
  ));
  assert!(s.get_request(source.request_id).unwrap().is_some());
}

// ─── Archives ────────────────────────────────────────────────────────────────

#[test]
fn archives_need_an_existing_request() {
  let s = store();
  let orphan = UploadedArchive::new(Uuid::new_v4(), "facebook", "/tmp/a.zip", at(0));
  assert!(matches!(s.add_archive(&orphan), Err(Error::Database(_))));
}

#[test]
fn pending_archives_are_oldest_first() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let late = UploadedArchive::new(request.request_id, "twitter", "/tmp/t.zip", at(60));
  let early = UploadedArchive::new(request.request_id, "facebook", "/tmp/f.zip", at(0));
  let done = UploadedArchive::new(request.request_id, "youtube", "/tmp/y.zip", at(30));
  for archive in [&late, &early, &done] {
    s.add_archive(archive).unwrap();
  }
  s.mark_processed(done.archive_id, at(90)).unwrap();

  let pending: Vec<_> = s.pending_archives().unwrap().into_iter().map(|a| a.archive_id).collect();
  assert_eq!(pending, vec![early.archive_id, late.archive_id]);
  assert_eq!(s.archives_for_request(request.request_id).unwrap().len(), 3);
}

#[test]
fn terminal_timestamps_are_exclusive_and_final() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  s.mark_skipped(archive.archive_id, at(10)).unwrap();
  assert!(matches!(
    s.mark_processed(archive.archive_id, at(20)),
    Err(Error::ArchiveFinished(_))
  ));

  let stored = s.get_archive(archive.archive_id).unwrap().unwrap();
  assert_eq!(stored.skipped_at, Some(at(10)));
  assert!(stored.processed_at.is_none());

  assert!(matches!(
    s.mark_processed(Uuid::new_v4(), at(20)),
    Err(Error::ArchiveNotFound(_))
  ));
}

#[test]
fn an_archive_is_claimed_only_once() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  assert!(s.claim_archive(archive.archive_id, at(5)).unwrap());
  assert!(!s.claim_archive(archive.archive_id, at(6)).unwrap());
  assert!(s.pending_archives().unwrap().is_empty());

  let stored = s.get_archive(archive.archive_id).unwrap().unwrap();
  assert_eq!(stored.started_at, Some(at(5)));
  assert_eq!(stored.state(), ArchiveState::Processing);

  s.mark_processed(archive.archive_id, at(9)).unwrap();
  assert!(!s.claim_archive(archive.archive_id, at(10)).unwrap());
  assert!(matches!(
    s.claim_archive(Uuid::new_v4(), at(10)),
    Err(Error::ArchiveNotFound(_))
  ));
}

#[test]
fn finished_archives_cannot_be_claimed() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();
  s.mark_skipped(archive.archive_id, at(1)).unwrap();

  assert!(!s.claim_archive(archive.archive_id, at(2)).unwrap());
  assert!(s.get_archive(archive.archive_id).unwrap().unwrap().started_at.is_none());
}

#[test]
fn abandoned_claims_are_skipped() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let stale = UploadedArchive::new(request.request_id, "facebook", "/tmp/s.zip", at(0));
  let fresh = UploadedArchive::new(request.request_id, "twitter", "/tmp/f.zip", at(0));
  let finished = UploadedArchive::new(request.request_id, "youtube", "/tmp/y.zip", at(0));
  let waiting = UploadedArchive::new(request.request_id, "tumblr", "/tmp/t.zip", at(0));
  for archive in [&stale, &fresh, &finished, &waiting] {
    s.add_archive(archive).unwrap();
  }
  s.claim_archive(stale.archive_id, at(10)).unwrap();
  s.claim_archive(finished.archive_id, at(10)).unwrap();
  s.mark_processed(finished.archive_id, at(20)).unwrap();
  s.claim_archive(fresh.archive_id, at(100)).unwrap();

  let skipped = s.skip_abandoned(at(50), at(200)).unwrap();
  assert_eq!(skipped, vec![stale.archive_id]);

  let stale = s.get_archive(stale.archive_id).unwrap().unwrap();
  assert_eq!(stale.skipped_at, Some(at(200)));
  assert!(s.get_archive(fresh.archive_id).unwrap().unwrap().skipped_at.is_none());
  assert_eq!(s.get_archive(finished.archive_id).unwrap().unwrap().processed_at, Some(at(20)));

  let pending: Vec<_> = s.pending_archives().unwrap().into_iter().map(|a| a.archive_id).collect();
  assert_eq!(pending, vec![waiting.archive_id]);
}

#[test]
fn version_one_databases_gain_claims() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("old.db");
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE archives (
           archive_id   TEXT PRIMARY KEY,
           request_id   TEXT NOT NULL,
           service_id   TEXT NOT NULL,
           path         TEXT NOT NULL,
           uploaded_at  TEXT NOT NULL,
           processed_at TEXT,
           skipped_at   TEXT
         );
         PRAGMA user_version = 1;",
      )
      .unwrap();
  }

  let s = SqliteStore::open(&path).unwrap();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();
  assert!(s.claim_archive(archive.archive_id, at(1)).unwrap());
}

#[test]
fn archives_move_between_requests() {
  let s = store();
  let from = s.create_request(new_request("alice")).unwrap();
  let to = s.create_request(new_request("alice-2")).unwrap();
  let archive = UploadedArchive::new(from.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  s.move_archive(archive.archive_id, to.request_id).unwrap();
  assert!(s.archives_for_request(from.request_id).unwrap().is_empty());
  assert_eq!(s.archives_for_request(to.request_id).unwrap()[0].archive_id, archive.archive_id);
}

#[test]
fn archive_path_can_be_rewritten() {
  let s = store();
  let request = s.create_request(new_request("alice")).unwrap();
  let archive = UploadedArchive::new(request.request_id, "facebook", "/tmp/a.zip", at(0));
  s.add_archive(&archive).unwrap();

  s.update_archive_path(archive.archive_id, Path::new("/tmp/a.zip.sealed")).unwrap();
  let stored = s.get_archive(archive.archive_id).unwrap().unwrap();
  assert_eq!(stored.path, Path::new("/tmp/a.zip.sealed"));
  assert_eq!(stored.uploaded_at, at(0));
  assert!(
    s.update_archive_path(Uuid::new_v4(), Path::new("/x")).is_err(),
    "unknown archives are reported"
  );
}

#[test]
fn times_survive_sub_second_precision() {
  let s = store();
  let precise = at(0) + Duration::nanoseconds(123_456_789);
  s.create(NewRecord::new("g", "alice", serde_json::Map::new(), precise)).unwrap();
  assert_eq!(s.list_records(&RecordQuery::default()).unwrap()[0].occurred_at, precise);
}
