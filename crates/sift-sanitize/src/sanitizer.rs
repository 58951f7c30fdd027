use serde_json::{Map, Value, json};

use crate::{
  Error, Result,
  annotate::AnnotationRegistry,
  crypto::SealingKey,
  rules::{Action, FieldRule},
};

/// Seals, hashes and annotates sensitive fields.
///
/// Built once per deployment and shared read-only by every archive job.
/// When encryption is disabled, sealing and hashing leave the raw value in
/// place under its original name; annotations are still added.
#[derive(Debug)]
pub struct Sanitizer {
  key:         Option<SealingKey>,
  annotations: AnnotationRegistry,
}

impl Sanitizer {
  /// Enabled sanitizer for a base64 public key.
  pub fn new(public_key: &str) -> Result<Self> {
    Ok(Self {
      key:         Some(SealingKey::from_base64(public_key)?),
      annotations: AnnotationRegistry::builtin(),
    })
  }

  /// Pass-through sanitizer that only annotates.
  pub fn disabled() -> Self {
    Self {
      key:         None,
      annotations: AnnotationRegistry::builtin(),
    }
  }

  pub fn from_config(public_key: Option<&str>, encryption_enabled: bool) -> Result<Self> {
    match (encryption_enabled, public_key) {
      (false, _) => Ok(Self::disabled()),
      (true, Some(key)) => Self::new(key),
      (true, None) => Err(Error::MissingPublicKey),
    }
  }

  pub fn with_annotations(mut self, annotations: AnnotationRegistry) -> Self {
    self.annotations = annotations;
    self
  }

  pub fn is_enabled(&self) -> bool { self.key.is_some() }

  pub fn annotations(&self) -> &AnnotationRegistry { &self.annotations }

  // ── Scalar helpers ────────────────────────────────────────────────────

  /// Base64 sealed box of `text`, or `text` itself when disabled.
  pub fn seal_text(&self, text: &str) -> Result<String> {
    match &self.key {
      Some(key) => key.seal(text.as_bytes()),
      None => Ok(text.to_owned()),
    }
  }

  /// Salted digest of `text`, or `text` itself when disabled.
  pub fn hash_text(&self, text: &str) -> String {
    match &self.key {
      Some(key) => key.hash(text),
      None => text.to_owned(),
    }
  }

  // ── Map helpers ───────────────────────────────────────────────────────

  /// Insert `pdk_encrypted_<field>` (or `field` when disabled).
  pub fn seal(&self, map: &mut Map<String, Value>, field: &str, text: &str) -> Result<()> {
    let key = self.derived_name("pdk_encrypted", field);
    map.insert(key, Value::String(self.seal_text(text)?));
    Ok(())
  }

  /// Insert `pdk_hashed_<field>` (or `field` when disabled).
  pub fn hash(&self, map: &mut Map<String, Value>, field: &str, text: &str) {
    let key = self.derived_name("pdk_hashed", field);
    map.insert(key, Value::String(self.hash_text(text)));
  }

  /// Seal the pretty-printed JSON form of `value`.
  pub fn seal_json(&self, map: &mut Map<String, Value>, field: &str, value: &Value) -> Result<()> {
    if self.is_enabled() {
      let text = serde_json::to_string_pretty(value)?;
      self.seal(map, field, &text)
    } else {
      map.insert(field.to_owned(), value.clone());
      Ok(())
    }
  }

  /// Add every registered annotation for `text`.
  pub fn annotate(&self, map: &mut Map<String, Value>, field: &str, text: &str) {
    map.extend(self.annotations.annotate(text, Some(field)));
  }

  /// Seal and annotate in one step.
  pub fn seal_annotated(&self, map: &mut Map<String, Value>, field: &str, text: &str) -> Result<()> {
    self.seal(map, field, text)?;
    self.annotate(map, field, text);
    Ok(())
  }

  /// Seal and hash in one step.
  pub fn seal_and_hash(&self, map: &mut Map<String, Value>, field: &str, text: &str) -> Result<()> {
    self.seal(map, field, text)?;
    self.hash(map, field, text);
    Ok(())
  }

  /// Insert `pdk_length_<field>`.
  pub fn length(&self, map: &mut Map<String, Value>, field: &str, text: &str) {
    map.insert(format!("pdk_length_{field}"), json!(text.chars().count()));
  }

  fn derived_name(&self, prefix: &str, field: &str) -> String {
    if self.is_enabled() {
      format!("{prefix}_{field}")
    } else {
      field.to_owned()
    }
  }

  // ── Rules ─────────────────────────────────────────────────────────────

  /// Apply `rules` in order to `value`. Paths that do not exist, or that
  /// lead to `null`, are skipped.
  pub fn apply(&self, value: &mut Value, rules: &[FieldRule]) -> Result<()> {
    for rule in rules {
      self.apply_at(value, rule.path, rule.action)?;
    }
    Ok(())
  }

  fn apply_at(&self, node: &mut Value, path: &[&str], action: Action) -> Result<()> {
    match path {
      [] => Ok(()),
      ["*", rest @ ..] => {
        if let Value::Array(items) = node {
          for item in items {
            self.apply_at(item, rest, action)?;
          }
        }
        Ok(())
      }
      [field] => match node {
        Value::Object(map) => self.transform(map, field, action),
        _ => Ok(()),
      },
      [key, rest @ ..] => match node.get_mut(*key) {
        Some(child) => self.apply_at(child, rest, action),
        None => Ok(()),
      },
    }
  }

  fn transform(&self, map: &mut Map<String, Value>, field: &str, action: Action) -> Result<()> {
    let Some(raw) = map.remove(field) else {
      return Ok(());
    };
    if raw.is_null() {
      map.insert(field.to_owned(), raw);
      return Ok(());
    }

    let text = if action.as_json() {
      serde_json::to_string_pretty(&raw)?
    } else {
      match &raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      }
    };

    if !self.is_enabled() && (action.seals() || action.hashes()) {
      map.insert(field.to_owned(), raw);
    } else {
      if action.seals() {
        self.seal(map, field, &text)?;
      }
      if action.hashes() {
        self.hash(map, field, &text);
      }
    }
    if action.annotates() {
      self.annotate(map, field, &text);
    }
    if action.measures_length() {
      self.length(map, field, &text);
    }
    Ok(())
  }
}
