//! Import requests: one data subject's consent-scoped upload session.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result, archive::UploadedArchive};

/// Length in hex characters of an upload token.
pub const TOKEN_LEN: usize = 256;

/// Generate a fresh upload token from the OS CSPRNG.
pub fn generate_token() -> String {
  let mut bytes = [0u8; TOKEN_LEN / 2];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
  pub request_id:   Uuid,
  /// The data subject every record from this request is filed under.
  pub subject_id:   String,
  pub email:        String,
  pub token:        String,
  /// Ids of the services the subject agreed to export.
  pub services:     BTreeSet<String>,
  pub extras:       Map<String, Value>,
  pub can_email:    bool,
  pub last_emailed: Option<DateTime<Utc>>,
  pub requested_at: DateTime<Utc>,
}

/// Input to [`crate::store::ImportLedger::create_request`].
#[derive(Debug, Clone)]
pub struct NewImportRequest {
  pub subject_id: String,
  pub email:      String,
  pub services:   BTreeSet<String>,
  pub extras:     Map<String, Value>,
}

impl NewImportRequest {
  pub fn new(subject_id: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      subject_id: subject_id.into(),
      email:      email.into(),
      services:   BTreeSet::new(),
      extras:     Map::new(),
    }
  }

  /// Build the persisted form, assigning id, token and request time.
  pub fn into_request(self, requested_at: DateTime<Utc>) -> ImportRequest {
    ImportRequest {
      request_id: Uuid::new_v4(),
      subject_id: self.subject_id,
      email: self.email,
      token: generate_token(),
      services: self.services,
      extras: self.extras,
      can_email: true,
      last_emailed: None,
      requested_at,
    }
  }
}

impl ImportRequest {
  /// Fold `other` into `self`.
  ///
  /// The more recent request supplies the contact fields and consent flag.
  /// Services are unioned, extras only fill keys `self` lacks, and the latest
  /// reminder time is kept. Moving `other`'s archives and records is the
  /// caller's job.
  pub fn merge(&mut self, other: &ImportRequest) -> Result<()> {
    if other.request_id == self.request_id {
      return Err(Error::SelfMerge(self.request_id));
    }

    if other.requested_at > self.requested_at {
      self.email = other.email.clone();
      self.token = other.token.clone();
      self.can_email = other.can_email;
    }

    self.last_emailed = match (self.last_emailed, other.last_emailed) {
      (Some(a), Some(b)) => Some(a.max(b)),
      (a, b) => a.or(b),
    };

    self.services.extend(other.services.iter().cloned());

    for (key, value) in &other.extras {
      if !self.extras.contains_key(key) {
        self.extras.insert(key.clone(), value.clone());
      }
    }

    Ok(())
  }

  /// Services in scope that have no uploaded archive yet.
  pub fn incomplete_services(&self, archives: &[UploadedArchive]) -> Vec<String> {
    self
      .services
      .iter()
      .filter(|service| !archives.iter().any(|a| &a.service_id == *service))
      .cloned()
      .collect()
  }

  pub fn completed(&self, archives: &[UploadedArchive]) -> bool {
    self.incomplete_services(archives).is_empty()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use serde_json::json;

  use super::*;

  fn request(subject: &str, at: DateTime<Utc>) -> ImportRequest {
    let mut input = NewImportRequest::new(subject, format!("{subject}@example.com"));
    input.services.insert("facebook".into());
    input.into_request(at)
  }

  #[test]
  fn tokens_are_hex_and_unique() {
    let a = generate_token();
    let b = generate_token();
    assert_eq!(a.len(), TOKEN_LEN);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
  }

  #[test]
  fn merge_prefers_newer_contact_details() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut older = request("p-1", t0);
    let mut newer = request("p-2", t0 + Duration::days(3));
    newer.services.insert("youtube".into());
    newer.can_email = false;
    older.extras.insert("cohort".into(), json!("a"));
    newer.extras.insert("cohort".into(), json!("b"));
    newer.extras.insert("site".into(), json!("north"));
    newer.last_emailed = Some(t0 + Duration::days(1));

    older.merge(&newer).unwrap();

    assert_eq!(older.email, "p-2@example.com");
    assert!(!older.can_email);
    assert!(older.services.contains("youtube"));
    assert_eq!(older.extras["cohort"], "a");
    assert_eq!(older.extras["site"], "north");
    assert_eq!(older.last_emailed, Some(t0 + Duration::days(1)));
  }

  #[test]
  fn merge_with_self_is_rejected() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut r = request("p-1", t0);
    let copy = r.clone();
    assert!(matches!(r.merge(&copy), Err(Error::SelfMerge(_))));
  }

  #[test]
  fn incomplete_services_lists_missing_uploads() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut r = request("p-1", t0);
    r.services.insert("amazon".into());

    let archive = UploadedArchive::new(r.request_id, "facebook", "/tmp/a.zip", t0);
    assert_eq!(r.incomplete_services(&[archive.clone()]), vec!["amazon".to_string()]);
    assert!(!r.completed(&[archive]));
  }
}
