//! Normalized records: the single output shape of every extractor.
//!
//! A record is an immutable observation about a data subject taken from one
//! service's export. Records are never updated once the store accepts them.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

/// Prefix shared by every generator id this pipeline produces.
pub const GENERATOR_PREFIX: &str = "pdk-external";

/// Build a generator id such as `pdk-external-twitter-tweet`.
pub fn generator_id(service: &str, category: &str) -> String {
  format!("{GENERATOR_PREFIX}-{service}-{category}")
}

// ─── Secondary tag ───────────────────────────────────────────────────────────

/// Coarse classification used for timeline grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecondaryTag {
  #[serde(rename = "active")]
  Active,
  #[serde(rename = "passive")]
  Passive,
  #[serde(rename = "incoming active")]
  IncomingActive,
  #[serde(rename = "none")]
  None,
}

impl SecondaryTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Passive => "passive",
      Self::IncomingActive => "incoming active",
      Self::None => "none",
    }
  }
}

impl fmt::Display for SecondaryTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SecondaryTag {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "passive" => Ok(Self::Passive),
      "incoming active" => Ok(Self::IncomingActive),
      "none" => Ok(Self::None),
      other => Err(Error::UnknownSecondaryTag(other.to_owned())),
    }
  }
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// A record as built by an extractor, before the store accepts it.
/// `record_id` and `ingested_at` are always assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
  pub generator_id:  String,
  pub subject_id:    String,
  pub secondary_tag: Option<SecondaryTag>,
  pub properties:    Map<String, Value>,
  /// Timestamp reported by the source service, normalized to UTC.
  pub occurred_at:   DateTime<Utc>,
}

impl NewRecord {
  pub fn new(
    generator_id: impl Into<String>,
    subject_id: impl Into<String>,
    properties: Map<String, Value>,
    occurred_at: DateTime<Utc>,
  ) -> Self {
    Self {
      generator_id: generator_id.into(),
      subject_id: subject_id.into(),
      secondary_tag: None,
      properties,
      occurred_at,
    }
  }

  /// Like [`NewRecord::new`] but accepts any JSON value, which must be an
  /// object.
  pub fn from_value(
    generator_id: impl Into<String>,
    subject_id: impl Into<String>,
    properties: Value,
    occurred_at: DateTime<Utc>,
  ) -> Result<Self> {
    match properties {
      Value::Object(map) => {
        Ok(Self::new(generator_id, subject_id, map, occurred_at))
      }
      _ => Err(Error::PropertiesNotObject),
    }
  }

  pub fn with_tag(mut self, tag: SecondaryTag) -> Self {
    self.secondary_tag = Some(tag);
    self
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted record. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub record_id:     Uuid,
  pub generator_id:  String,
  pub subject_id:    String,
  pub secondary_tag: Option<SecondaryTag>,
  pub properties:    Map<String, Value>,
  pub occurred_at:   DateTime<Utc>,
  /// Server-assigned processing time.
  pub ingested_at:   DateTime<Utc>,
}

impl Record {
  /// Accept `input`, stamping it with a fresh id and `ingested_at`.
  pub fn accept(input: NewRecord, ingested_at: DateTime<Utc>) -> Self {
    Self {
      record_id: Uuid::new_v4(),
      generator_id: input.generator_id,
      subject_id: input.subject_id,
      secondary_tag: input.secondary_tag,
      properties: input.properties,
      occurred_at: input.occurred_at,
      ingested_at,
    }
  }
}
