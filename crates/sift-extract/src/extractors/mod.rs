//! Per-service extractors.

use std::{fmt, path::Path};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Result, context::ImportContext};

mod amazon;
mod chatgpt;
mod facebook;
mod instagram;
mod linkedin;
mod snapchat;
mod tumblr;
mod twitter;
mod youtube;

pub use amazon::Amazon;
pub use chatgpt::ChatGpt;
pub use facebook::Facebook;
pub use instagram::Instagram;
pub use linkedin::LinkedIn;
pub use snapchat::Snapchat;
pub use tumblr::Tumblr;
pub use twitter::Twitter;
pub use youtube::YouTube;

/// Imports one service's export format.
pub trait Extractor: Send + Sync {
  /// Registry key, e.g. `twitter`.
  fn service_id(&self) -> &'static str;

  /// Walk the archive at `path`, pushing every kept record into `ctx`.
  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()>;

  /// Human-facing summary of a record this extractor produced, or `None`
  /// for generator ids it does not own.
  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
  Incoming,
  Outgoing,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Incoming => "Incoming",
      Self::Outgoing => "Outgoing",
    })
  }
}

/// Display metadata for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDescription {
  pub service:    String,
  pub event:      String,
  pub direction:  Option<Direction>,
  pub media_type: Option<String>,
}

impl EventDescription {
  pub fn new(service: impl Into<String>, event: impl Into<String>) -> Self {
    Self {
      service:    service.into(),
      event:      event.into(),
      direction:  None,
      media_type: None,
    }
  }

  pub fn outgoing(mut self) -> Self {
    self.direction = Some(Direction::Outgoing);
    self
  }

  pub fn incoming(mut self) -> Self {
    self.direction = Some(Direction::Incoming);
    self
  }

  pub fn direction(mut self, direction: Option<Direction>) -> Self {
    self.direction = direction;
    self
  }

  pub fn media(mut self, media_type: impl Into<String>) -> Self {
    self.media_type = Some(media_type.into());
    self
  }
}

/// `Some(default description)` when `generator_id` belongs to `service`.
/// Unrecognised categories are described by their generator id.
pub(crate) fn owned_by(service: &str, display: &str, generator_id: &str) -> Option<EventDescription> {
  let prefix = sift_core::record::generator_id(service, "");
  generator_id
    .starts_with(&prefix)
    .then(|| EventDescription::new(display, generator_id))
}
