//! Declarative field rules.
//!
//! Extractors describe what happens to each sensitive field as a list of
//! `(path, action)` pairs instead of hand-written mutation code. A path is a
//! sequence of object keys; `*` steps into every element of an array.

/// What to do with the value found at a rule's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// Replace with `pdk_encrypted_<f>`.
  Seal,
  /// Seal and add annotations.
  SealAnnotated,
  /// Replace with `pdk_hashed_<f>`.
  Hash,
  SealAndHash,
  SealAndHashAnnotated,
  /// Serialize the value as pretty JSON, then seal it.
  SealJson,
  /// Seal the JSON form and annotate it.
  SealJsonAnnotated,
  /// Seal and record only the character count.
  SealWithLength,
  /// Replace with `pdk_length_<f>`.
  Length,
  /// Remove without trace.
  Drop,
}

impl Action {
  pub(crate) fn seals(self) -> bool {
    matches!(
      self,
      Self::Seal
        | Self::SealAnnotated
        | Self::SealAndHash
        | Self::SealAndHashAnnotated
        | Self::SealJson
        | Self::SealJsonAnnotated
        | Self::SealWithLength
    )
  }

  pub(crate) fn hashes(self) -> bool {
    matches!(self, Self::Hash | Self::SealAndHash | Self::SealAndHashAnnotated)
  }

  pub(crate) fn annotates(self) -> bool {
    matches!(
      self,
      Self::SealAnnotated | Self::SealAndHashAnnotated | Self::SealJsonAnnotated
    )
  }

  pub(crate) fn measures_length(self) -> bool {
    matches!(self, Self::SealWithLength | Self::Length)
  }

  pub(crate) fn as_json(self) -> bool {
    matches!(self, Self::SealJson | Self::SealJsonAnnotated)
  }
}

/// One `(path, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
  pub path:   &'static [&'static str],
  pub action: Action,
}

impl FieldRule {
  pub const fn new(path: &'static [&'static str], action: Action) -> Self {
    Self { path, action }
  }
}
