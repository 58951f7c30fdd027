//! Inclusion policies: decide whether a candidate record is kept at all.
//!
//! Consulted before any sanitization or persistence work, so a rejected
//! record costs nothing beyond timestamp resolution.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

pub trait InclusionPolicy: Send + Sync {
  fn should_include(&self, subject_id: &str, occurred_at: DateTime<Utc>, raw: &Value) -> bool;
}

/// Keep everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl InclusionPolicy for IncludeAll {
  fn should_include(&self, _: &str, _: DateTime<Utc>, _: &Value) -> bool { true }
}

/// Keep records whose timestamp falls inside an optional closed window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RetentionWindow {
  pub not_before: Option<DateTime<Utc>>,
  pub not_after:  Option<DateTime<Utc>>,
}

impl InclusionPolicy for RetentionWindow {
  fn should_include(&self, _: &str, occurred_at: DateTime<Utc>, _: &Value) -> bool {
    self.not_before.is_none_or(|start| occurred_at >= start)
      && self.not_after.is_none_or(|end| occurred_at <= end)
  }
}

impl<F> InclusionPolicy for F
where
  F: Fn(&str, DateTime<Utc>, &Value) -> bool + Send + Sync,
{
  fn should_include(&self, subject_id: &str, occurred_at: DateTime<Utc>, raw: &Value) -> bool {
    self(subject_id, occurred_at, raw)
  }
}
