//! [`SqliteStore`], the SQLite implementation of [`RecordStore`] and
//! [`ImportLedger`].

use std::{
  path::Path,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, types::Value as SqlValue};
use sift_core::{
  archive::UploadedArchive,
  record::{NewRecord, Record},
  request::{ImportRequest, NewImportRequest},
  service::ServiceDefinition,
  store::{ImportLedger, RecordQuery, RecordStore},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawArchive, RawRecord, RawRequest, RawService, decode_uuid, encode_dt, encode_object,
    encode_services, encode_uuid,
  },
  schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Sift record store and import ledger backed by a single SQLite file.
///
/// Share it between threads behind an `Arc`; calls are serialized on the
/// inner connection.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::init(Connection::open(path)?)
  }

  /// Open an in-memory store, useful for testing.
  pub fn open_in_memory() -> Result<Self> { Self::init(Connection::open_in_memory()?) }

  fn init(conn: Connection) -> Result<Self> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > 0 {
      for (target, ddl) in MIGRATIONS {
        if version < *target {
          debug!(from = version, to = target, "migrating store schema");
          conn.execute_batch(ddl)?;
        }
      }
    }
    conn.execute_batch(SCHEMA)?;
    debug!(version = SCHEMA_VERSION, "store schema ready");
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| Error::Poisoned)
  }

  fn insert_record(conn: &Connection, record: &Record) -> Result<()> {
    let mut stmt = conn.prepare_cached(
      "INSERT INTO records (
         record_id, generator_id, subject_id, secondary_tag,
         properties, occurred_at, ingested_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    stmt.execute(rusqlite::params![
      encode_uuid(record.record_id),
      record.generator_id,
      record.subject_id,
      record.secondary_tag.map(|t| t.as_str()),
      encode_object(&record.properties)?,
      encode_dt(record.occurred_at),
      encode_dt(record.ingested_at),
    ])?;
    Ok(())
  }

  fn query_archives(&self, where_clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<UploadedArchive>> {
    let conn = self.conn()?;
    let sql = format!(
      "SELECT {} FROM archives {where_clause} ORDER BY uploaded_at, archive_id",
      RawArchive::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params, RawArchive::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawArchive::into_archive).collect()
  }

  /// Set one of the terminal timestamps on an archive that has neither.
  fn finish_archive(&self, archive_id: Uuid, column: &str, at: DateTime<Utc>) -> Result<()> {
    let conn = self.conn()?;
    let id_str = encode_uuid(archive_id);
    let changed = conn.execute(
      &format!(
        "UPDATE archives SET {column} = ?1
         WHERE archive_id = ?2 AND processed_at IS NULL AND skipped_at IS NULL"
      ),
      rusqlite::params![encode_dt(at), id_str],
    )?;
    if changed == 1 {
      return Ok(());
    }

    Err(if Self::archive_exists(&conn, &id_str)? {
      Error::ArchiveFinished(archive_id)
    } else {
      Error::ArchiveNotFound(archive_id)
    })
  }

  fn write_request(conn: &Connection, request: &ImportRequest) -> Result<()> {
    let changed = conn.execute(
      "UPDATE requests SET
         subject_id = ?2, email = ?3, token = ?4, services = ?5,
         extras = ?6, can_email = ?7, last_emailed = ?8
       WHERE request_id = ?1",
      rusqlite::params![
        encode_uuid(request.request_id),
        request.subject_id,
        request.email,
        request.token,
        encode_services(&request.services)?,
        encode_object(&request.extras)?,
        request.can_email,
        request.last_emailed.map(encode_dt),
      ],
    )?;
    if changed == 0 {
      return Err(Error::RequestNotFound(request.request_id));
    }
    Ok(())
  }

  fn archive_exists(conn: &Connection, id_str: &str) -> Result<bool> {
    Ok(
      conn
        .query_row(
          "SELECT 1 FROM archives WHERE archive_id = ?1",
          rusqlite::params![id_str],
          |_| Ok(()),
        )
        .optional()?
        .is_some(),
    )
  }
}

/// `WHERE` clause and positional parameters for a [`RecordQuery`].
fn record_filter(query: &RecordQuery) -> (String, Vec<SqlValue>) {
  let mut conds: Vec<&'static str> = vec![];
  let mut params: Vec<SqlValue> = vec![];

  if let Some(subject) = &query.subject_id {
    conds.push("subject_id = ?");
    params.push(SqlValue::Text(subject.clone()));
  }
  if let Some(generator) = &query.generator_id {
    conds.push("generator_id = ?");
    params.push(SqlValue::Text(generator.clone()));
  }
  if let Some(prefix) = &query.generator_prefix {
    conds.push("substr(generator_id, 1, length(?)) = ?");
    params.push(SqlValue::Text(prefix.clone()));
    params.push(SqlValue::Text(prefix.clone()));
  }
  if let Some(after) = query.occurred_after {
    conds.push("occurred_at >= ?");
    params.push(SqlValue::Text(encode_dt(after)));
  }
  if let Some(before) = query.occurred_before {
    conds.push("occurred_at < ?");
    params.push(SqlValue::Text(encode_dt(before)));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (where_clause, params)
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  fn create(&self, input: NewRecord) -> Result<Record> {
    let record = Record::accept(input, Utc::now());
    Self::insert_record(&*self.conn()?, &record)?;
    Ok(record)
  }

  fn bulk_insert(&self, records: Vec<NewRecord>) -> Result<usize> {
    if records.is_empty() {
      return Ok(0);
    }

    let ingested_at = Utc::now();
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    let count = records.len();
    for input in records {
      Self::insert_record(&tx, &Record::accept(input, ingested_at))?;
    }
    tx.commit()?;

    debug!(count, "records inserted");
    Ok(count)
  }

  fn list_records(&self, query: &RecordQuery) -> Result<Vec<Record>> {
    let (where_clause, mut params) = record_filter(query);
    // SQLite treats a negative limit as unbounded.
    params.push(SqlValue::Integer(query.limit.map_or(-1, |l| l as i64)));
    params.push(SqlValue::Integer(query.offset.unwrap_or(0) as i64));

    let conn = self.conn()?;
    let sql = format!(
      "SELECT {} FROM records {where_clause}
       ORDER BY occurred_at, rowid
       LIMIT ? OFFSET ?",
      RawRecord::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let raws = stmt
      .query_map(rusqlite::params_from_iter(params), RawRecord::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  fn count_records(&self, query: &RecordQuery) -> Result<usize> {
    let (where_clause, params) = record_filter(query);
    let conn = self.conn()?;
    let count: i64 = conn.query_row(
      &format!("SELECT COUNT(*) FROM records {where_clause}"),
      rusqlite::params_from_iter(params),
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  fn reassign_subject(&self, from: &str, to: &str) -> Result<usize> {
    let conn = self.conn()?;
    let moved = conn.execute(
      "UPDATE records SET subject_id = ?1 WHERE subject_id = ?2",
      rusqlite::params![to, from],
    )?;
    Ok(moved)
  }
}

// ─── ImportLedger impl ───────────────────────────────────────────────────────

impl ImportLedger for SqliteStore {
  type Error = Error;

  // ── Services ──────────────────────────────────────────────────────────

  fn upsert_service(&self, service: &ServiceDefinition) -> Result<()> {
    self.conn()?.execute(
      "INSERT INTO services (service_id, name, priority, archive_extension)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (service_id) DO UPDATE SET
         name = excluded.name,
         priority = excluded.priority,
         archive_extension = excluded.archive_extension",
      rusqlite::params![
        service.id,
        service.name,
        service.priority,
        service.archive_extension.as_str(),
      ],
    )?;
    Ok(())
  }

  fn list_services(&self) -> Result<Vec<ServiceDefinition>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT service_id, name, priority, archive_extension
       FROM services ORDER BY priority, service_id",
    )?;
    let raws = stmt
      .query_map([], |row| {
        Ok(RawService {
          service_id:        row.get(0)?,
          name:              row.get(1)?,
          priority:          row.get(2)?,
          archive_extension: row.get(3)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawService::into_service).collect()
  }

  // ── Requests ──────────────────────────────────────────────────────────

  fn create_request(&self, input: NewImportRequest) -> Result<ImportRequest> {
    let request = input.into_request(Utc::now());

    self.conn()?.execute(
      &format!(
        "INSERT INTO requests ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        RawRequest::COLUMNS
      ),
      rusqlite::params![
        encode_uuid(request.request_id),
        request.subject_id,
        request.email,
        request.token,
        encode_services(&request.services)?,
        encode_object(&request.extras)?,
        request.can_email,
        request.last_emailed.map(encode_dt),
        encode_dt(request.requested_at),
      ],
    )?;
    Ok(request)
  }

  fn get_request(&self, id: Uuid) -> Result<Option<ImportRequest>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!("SELECT {} FROM requests WHERE request_id = ?1", RawRequest::COLUMNS),
        rusqlite::params![encode_uuid(id)],
        RawRequest::from_row,
      )
      .optional()?;

    raw.map(RawRequest::into_request).transpose()
  }

  fn get_request_by_token(&self, token: &str) -> Result<Option<ImportRequest>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!("SELECT {} FROM requests WHERE token = ?1", RawRequest::COLUMNS),
        rusqlite::params![token],
        RawRequest::from_row,
      )
      .optional()?;

    raw.map(RawRequest::into_request).transpose()
  }

  fn update_request(&self, request: &ImportRequest) -> Result<()> {
    Self::write_request(&*self.conn()?, request)
  }

  fn absorb_request(&self, source_id: Uuid, destination: &ImportRequest) -> Result<usize> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let moved = tx.execute(
      "UPDATE archives SET request_id = ?1 WHERE request_id = ?2",
      rusqlite::params![encode_uuid(destination.request_id), encode_uuid(source_id)],
    )?;
    // The source goes before the destination is written: they may share a
    // token afterwards.
    let deleted = tx.execute(
      "DELETE FROM requests WHERE request_id = ?1",
      rusqlite::params![encode_uuid(source_id)],
    )?;
    if deleted == 0 {
      return Err(Error::RequestNotFound(source_id));
    }
    Self::write_request(&tx, destination)?;
    tx.commit()?;

    debug!(%source_id, destination_id = %destination.request_id, moved, "request absorbed");
    Ok(moved)
  }

  fn delete_request(&self, id: Uuid) -> Result<()> {
    let deleted = self.conn()?.execute(
      "DELETE FROM requests WHERE request_id = ?1",
      rusqlite::params![encode_uuid(id)],
    )?;
    if deleted == 0 {
      return Err(Error::RequestNotFound(id));
    }
    Ok(())
  }

  // ── Archives ──────────────────────────────────────────────────────────

  fn add_archive(&self, archive: &UploadedArchive) -> Result<()> {
    self.conn()?.execute(
      &format!(
        "INSERT INTO archives ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        RawArchive::COLUMNS
      ),
      rusqlite::params![
        encode_uuid(archive.archive_id),
        encode_uuid(archive.request_id),
        archive.service_id,
        archive.path.to_string_lossy(),
        encode_dt(archive.uploaded_at),
        archive.started_at.map(encode_dt),
        archive.processed_at.map(encode_dt),
        archive.skipped_at.map(encode_dt),
      ],
    )?;
    Ok(())
  }

  fn get_archive(&self, id: Uuid) -> Result<Option<UploadedArchive>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!("SELECT {} FROM archives WHERE archive_id = ?1", RawArchive::COLUMNS),
        rusqlite::params![encode_uuid(id)],
        RawArchive::from_row,
      )
      .optional()?;

    raw.map(RawArchive::into_archive).transpose()
  }

  fn pending_archives(&self) -> Result<Vec<UploadedArchive>> {
    self.query_archives(
      "WHERE started_at IS NULL AND processed_at IS NULL AND skipped_at IS NULL",
      &[],
    )
  }

  fn archives_for_request(&self, request_id: Uuid) -> Result<Vec<UploadedArchive>> {
    self.query_archives("WHERE request_id = ?1", &[&encode_uuid(request_id)])
  }

  fn move_archive(&self, archive_id: Uuid, request_id: Uuid) -> Result<()> {
    let changed = self.conn()?.execute(
      "UPDATE archives SET request_id = ?1 WHERE archive_id = ?2",
      rusqlite::params![encode_uuid(request_id), encode_uuid(archive_id)],
    )?;
    if changed == 0 {
      return Err(Error::ArchiveNotFound(archive_id));
    }
    Ok(())
  }

  fn claim_archive(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let conn = self.conn()?;
    let id_str = encode_uuid(archive_id);
    let changed = conn.execute(
      "UPDATE archives SET started_at = ?1
       WHERE archive_id = ?2
         AND started_at IS NULL AND processed_at IS NULL AND skipped_at IS NULL",
      rusqlite::params![encode_dt(at), id_str],
    )?;
    if changed == 1 {
      return Ok(true);
    }
    if Self::archive_exists(&conn, &id_str)? {
      Ok(false)
    } else {
      Err(Error::ArchiveNotFound(archive_id))
    }
  }

  fn skip_abandoned(&self, started_before: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "UPDATE archives SET skipped_at = ?1
       WHERE started_at IS NOT NULL AND started_at < ?2
         AND processed_at IS NULL AND skipped_at IS NULL
       RETURNING archive_id",
    )?;
    let ids = stmt
      .query_map(
        rusqlite::params![encode_dt(at), encode_dt(started_before)],
        |row| row.get::<_, String>(0),
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    ids.iter().map(|id| decode_uuid(id)).collect()
  }

  fn mark_processed(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    self.finish_archive(archive_id, "processed_at", at)
  }

  fn mark_skipped(&self, archive_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    self.finish_archive(archive_id, "skipped_at", at)
  }

  fn update_archive_path(&self, archive_id: Uuid, path: &Path) -> Result<()> {
    let changed = self.conn()?.execute(
      "UPDATE archives SET path = ?1 WHERE archive_id = ?2",
      rusqlite::params![path.to_string_lossy(), encode_uuid(archive_id)],
    )?;
    if changed == 0 {
      return Err(Error::ArchiveNotFound(archive_id));
    }
    Ok(())
  }
}
