//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC so that text
//! comparison orders them chronologically. JSON-shaped fields (properties,
//! request services and extras) are stored as compact JSON. UUIDs are stored
//! as hyphenated lowercase strings.

use std::{collections::BTreeSet, path::PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sift_core::{
  archive::UploadedArchive,
  record::{Record, SecondaryTag},
  request::ImportRequest,
  service::{ArchiveExtension, ServiceDefinition},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── JSON objects ────────────────────────────────────────────────────────────

pub fn encode_object(map: &Map<String, Value>) -> Result<String> { Ok(serde_json::to_string(map)?) }

fn decode_object(s: &str) -> Result<Map<String, Value>> { Ok(serde_json::from_str(s)?) }

pub fn encode_services(services: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(services)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `records` row.
pub struct RawRecord {
  pub record_id:     String,
  pub generator_id:  String,
  pub subject_id:    String,
  pub secondary_tag: Option<String>,
  pub properties:    String,
  pub occurred_at:   String,
  pub ingested_at:   String,
}

impl RawRecord {
  pub const COLUMNS: &'static str =
    "record_id, generator_id, subject_id, secondary_tag, properties, occurred_at, ingested_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:     row.get(0)?,
      generator_id:  row.get(1)?,
      subject_id:    row.get(2)?,
      secondary_tag: row.get(3)?,
      properties:    row.get(4)?,
      occurred_at:   row.get(5)?,
      ingested_at:   row.get(6)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    let secondary_tag = self
      .secondary_tag
      .as_deref()
      .map(str::parse::<SecondaryTag>)
      .transpose()?;

    Ok(Record {
      record_id: decode_uuid(&self.record_id)?,
      generator_id: self.generator_id,
      subject_id: self.subject_id,
      secondary_tag,
      properties: decode_object(&self.properties)?,
      occurred_at: decode_dt(&self.occurred_at)?,
      ingested_at: decode_dt(&self.ingested_at)?,
    })
  }
}

/// Raw strings read directly from a `services` row.
pub struct RawService {
  pub service_id:        String,
  pub name:              String,
  pub priority:          i64,
  pub archive_extension: String,
}

impl RawService {
  pub fn into_service(self) -> Result<ServiceDefinition> {
    let archive_extension = ArchiveExtension::parse(&self.archive_extension)
      .ok_or(Error::ArchiveExtension(self.archive_extension))?;
    Ok(ServiceDefinition {
      id: self.service_id,
      name: self.name,
      priority: self.priority,
      archive_extension,
    })
  }
}

/// Raw strings read directly from a `requests` row.
pub struct RawRequest {
  pub request_id:   String,
  pub subject_id:   String,
  pub email:        String,
  pub token:        String,
  pub services:     String,
  pub extras:       String,
  pub can_email:    bool,
  pub last_emailed: Option<String>,
  pub requested_at: String,
}

impl RawRequest {
  pub const COLUMNS: &'static str = "request_id, subject_id, email, token, services, extras, \
                                     can_email, last_emailed, requested_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id:   row.get(0)?,
      subject_id:   row.get(1)?,
      email:        row.get(2)?,
      token:        row.get(3)?,
      services:     row.get(4)?,
      extras:       row.get(5)?,
      can_email:    row.get(6)?,
      last_emailed: row.get(7)?,
      requested_at: row.get(8)?,
    })
  }

  pub fn into_request(self) -> Result<ImportRequest> {
    Ok(ImportRequest {
      request_id:   decode_uuid(&self.request_id)?,
      subject_id:   self.subject_id,
      email:        self.email,
      token:        self.token,
      services:     serde_json::from_str(&self.services)?,
      extras:       decode_object(&self.extras)?,
      can_email:    self.can_email,
      last_emailed: decode_opt_dt(self.last_emailed)?,
      requested_at: decode_dt(&self.requested_at)?,
    })
  }
}

/// Raw strings read directly from an `archives` row.
pub struct RawArchive {
  pub archive_id:   String,
  pub request_id:   String,
  pub service_id:   String,
  pub path:         String,
  pub uploaded_at:  String,
  pub started_at:   Option<String>,
  pub processed_at: Option<String>,
  pub skipped_at:   Option<String>,
}

impl RawArchive {
  pub const COLUMNS: &'static str =
    "archive_id, request_id, service_id, path, uploaded_at, started_at, processed_at, skipped_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      archive_id:   row.get(0)?,
      request_id:   row.get(1)?,
      service_id:   row.get(2)?,
      path:         row.get(3)?,
      uploaded_at:  row.get(4)?,
      started_at:   row.get(5)?,
      processed_at: row.get(6)?,
      skipped_at:   row.get(7)?,
    })
  }

  pub fn into_archive(self) -> Result<UploadedArchive> {
    Ok(UploadedArchive {
      archive_id:   decode_uuid(&self.archive_id)?,
      request_id:   decode_uuid(&self.request_id)?,
      service_id:   self.service_id,
      path:         PathBuf::from(self.path),
      uploaded_at:  decode_dt(&self.uploaded_at)?,
      processed_at: decode_opt_dt(self.processed_at)?,
      skipped_at:   decode_opt_dt(self.skipped_at)?,
      started_at:   decode_opt_dt(self.started_at)?,
    })
  }
}
