//! Supported services: static reference data.

use serde::{Deserialize, Serialize};

/// The container format a service's export arrives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveExtension {
  Zip,
  Csv,
}

impl ArchiveExtension {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Zip => "zip",
      Self::Csv => "csv",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "zip" => Some(Self::Zip),
      "csv" => Some(Self::Csv),
      _ => None,
    }
  }
}

/// Identifies a supported platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
  /// Stable slug, e.g. `"facebook"`. Also the extractor registry key.
  pub id:                String,
  pub name:              String,
  /// Display order on the upload page; lower sorts first.
  pub priority:          i64,
  pub archive_extension: ArchiveExtension,
}

impl ServiceDefinition {
  pub fn new(
    id: &str,
    name: &str,
    priority: i64,
    archive_extension: ArchiveExtension,
  ) -> Self {
    Self {
      id: id.to_owned(),
      name: name.to_owned(),
      priority,
      archive_extension,
    }
  }

  /// The services this workspace ships extractors for, in priority order.
  pub fn builtin() -> Vec<Self> {
    use ArchiveExtension::{Csv, Zip};
    vec![
      Self::new("facebook", "Facebook", 0, Zip),
      Self::new("instagram", "Instagram", 1, Zip),
      Self::new("twitter", "Twitter", 2, Zip),
      Self::new("snapchat", "Snapchat", 3, Zip),
      Self::new("youtube", "YouTube", 4, Zip),
      Self::new("linkedin", "LinkedIn", 5, Zip),
      Self::new("tumblr", "Tumblr", 6, Zip),
      Self::new("chatgpt", "ChatGPT", 7, Zip),
      Self::new("amazon", "Amazon", 8, Csv),
    ]
  }
}
