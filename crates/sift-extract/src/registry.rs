//! Static service registry.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  context::ImportContext,
  extractors::{
    Amazon, ChatGpt, EventDescription, Extractor, Facebook, Instagram, LinkedIn, Snapchat, Tumblr,
    Twitter, YouTube,
  },
};

/// Maps service ids to extractors.
pub struct Registry {
  extractors: Vec<Box<dyn Extractor>>,
}

impl Registry {
  pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self { Self { extractors } }

  /// Every extractor shipped with Sift.
  pub fn builtin() -> Self {
    Self::new(vec![
      Box::new(Facebook),
      Box::new(Instagram),
      Box::new(Twitter),
      Box::new(Snapchat),
      Box::new(YouTube),
      Box::new(LinkedIn),
      Box::new(Tumblr),
      Box::new(ChatGpt),
      Box::new(Amazon),
    ])
  }

  pub fn get(&self, service_id: &str) -> Option<&dyn Extractor> {
    self
      .extractors
      .iter()
      .find(|e| e.service_id() == service_id)
      .map(|e| e.as_ref())
  }

  pub fn service_ids(&self) -> Vec<&'static str> {
    self.extractors.iter().map(|e| e.service_id()).collect()
  }

  /// Run the extractor for `service_id`, failing on unknown services.
  pub fn import(&self, service_id: &str, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    let extractor = self
      .get(service_id)
      .ok_or_else(|| Error::UnknownService(service_id.to_owned()))?;
    extractor.import(ctx, path)
  }

  /// Import and report success as a flag. An unknown service is `false`,
  /// never an error.
  pub fn process(&self, service_id: &str, ctx: &mut ImportContext<'_>, path: &Path) -> bool {
    if self.get(service_id).is_none() {
      warn!(service = service_id, "no extractor registered for service");
      return false;
    }
    match self.import(service_id, ctx, path) {
      Ok(()) => {
        info!(service = service_id, subject = ctx.subject_id(), "archive imported");
        true
      }
      Err(e) => {
        error!(service = service_id, subject = ctx.subject_id(), error = %e, "archive import failed");
        false
      }
    }
  }

  /// Ask each extractor in turn to describe a record.
  pub fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    self
      .extractors
      .iter()
      .find_map(|e| e.describe_event(generator_id, properties))
  }
}

impl Default for Registry {
  fn default() -> Self { Self::builtin() }
}
