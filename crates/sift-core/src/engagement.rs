//! Engagement events: derived interaction summaries.
//!
//! Every extractor may emit one of these alongside its content record. They
//! live under their own generator namespace and carry a fixed vocabulary of
//! secondary tags, so timeline code never has to understand service-specific
//! payloads.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::record::{GENERATOR_PREFIX, NewRecord, SecondaryTag};

/// Generator id for engagement events from `service`.
pub fn engagement_generator_id(service: &str) -> String {
  format!("{GENERATOR_PREFIX}-engagement-{service}")
}

/// Classify an engagement by its scores.
///
/// Incoming interaction wins; an absent outgoing score means no engagement
/// at all; otherwise any positive outgoing score is active.
pub fn classify(incoming: Option<f64>, outgoing: Option<f64>) -> SecondaryTag {
  match (incoming, outgoing) {
    (Some(i), _) if i > 0.0 => SecondaryTag::IncomingActive,
    (_, None) => SecondaryTag::None,
    (_, Some(o)) if o > 0.0 => SecondaryTag::Active,
    _ => SecondaryTag::Passive,
  }
}

/// Builder for an engagement event.
#[derive(Debug, Clone, PartialEq)]
pub struct Engagement {
  pub service:  String,
  pub kind:     String,
  /// Seconds.
  pub duration: f64,
  pub outgoing: Option<f64>,
  pub incoming: Option<f64>,
}

impl Engagement {
  pub fn new(service: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      service:  service.into(),
      kind:     kind.into(),
      duration: 0.0,
      outgoing: None,
      incoming: None,
    }
  }

  pub fn outgoing(mut self, score: f64) -> Self {
    self.outgoing = Some(score.clamp(0.0, 1.0));
    self
  }

  pub fn incoming(mut self, score: f64) -> Self {
    self.incoming = Some(score.clamp(0.0, 1.0));
    self
  }

  pub fn duration(mut self, seconds: f64) -> Self {
    self.duration = seconds.max(0.0);
    self
  }

  pub fn secondary_tag(&self) -> SecondaryTag {
    classify(self.incoming, self.outgoing)
  }

  pub fn into_record(self, subject_id: &str, occurred_at: DateTime<Utc>) -> NewRecord {
    let tag = self.secondary_tag();

    let mut properties = Map::new();
    properties.insert("type".into(), Value::String(self.kind));
    properties.insert("duration".into(), json!(self.duration));
    if let Some(o) = self.outgoing {
      properties.insert("outgoing_engagement".into(), json!(o));
    }
    if let Some(i) = self.incoming {
      properties.insert("incoming_engagement".into(), json!(i));
    }

    NewRecord::new(
      engagement_generator_id(&self.service),
      subject_id,
      properties,
      occurred_at,
    )
    .with_tag(tag)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn classification_table() {
    assert_eq!(classify(Some(0.5), None), SecondaryTag::IncomingActive);
    assert_eq!(classify(Some(0.0), None), SecondaryTag::None);
    assert_eq!(classify(None, None), SecondaryTag::None);
    assert_eq!(classify(None, Some(1.0)), SecondaryTag::Active);
    assert_eq!(classify(None, Some(0.0)), SecondaryTag::Passive);
  }

  #[test]
  fn incoming_takes_precedence_over_outgoing() {
    assert_eq!(classify(Some(1.0), Some(1.0)), SecondaryTag::IncomingActive);
    assert_eq!(classify(Some(0.0), Some(0.5)), SecondaryTag::Active);
  }

  #[test]
  fn record_carries_scores_and_namespace() {
    let at = Utc.with_ymd_and_hms(2023, 5, 5, 12, 0, 0).unwrap();
    let record = Engagement::new("youtube", "watch")
      .outgoing(0.5)
      .duration(42.0)
      .into_record("subject-1", at);

    assert_eq!(record.generator_id, "pdk-external-engagement-youtube");
    assert_eq!(record.secondary_tag, Some(SecondaryTag::Active));
    assert_eq!(record.properties["type"], "watch");
    assert_eq!(record.properties["duration"], 42.0);
    assert_eq!(record.properties["outgoing_engagement"], 0.5);
    assert!(!record.properties.contains_key("incoming_engagement"));
    assert_eq!(record.occurred_at, at);
  }

  #[test]
  fn scores_are_clamped_to_unit_interval() {
    let e = Engagement::new("x", "y").outgoing(3.0).incoming(-1.0);
    assert_eq!(e.outgoing, Some(1.0));
    assert_eq!(e.incoming, Some(0.0));
  }
}
