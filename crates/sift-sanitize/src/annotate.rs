//! Content annotators.
//!
//! An annotator derives a numeric feature from cleartext before it is sealed,
//! stored as `<prefix>_<field>` next to the sealed value. Aggregation answers
//! "what is the largest value of this feature anywhere in the record".

use serde_json::{Map, Value, json};

/// Field names never annotated by the word counter.
const WORD_COUNT_SKIP_FIELDS: &[&str] = &["url"];

/// Keys containing this marker are ignored during aggregation.
pub const EXCLUDED_MARKER: &str = "url";

pub trait Annotator: Send + Sync {
  /// Prefix of every field this annotator writes, e.g. `pdk_length`.
  fn prefix(&self) -> &'static str;

  /// Compute the feature for `content`. `None` when the field is not
  /// annotated at all.
  fn measure(&self, content: &str, field_name: Option<&str>) -> Option<u64>;

  /// Annotations for `content` as a map of derived field names to values.
  fn annotate(&self, content: &str, field_name: Option<&str>) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(value) = self.measure(content, field_name) {
      let key = match field_name {
        Some(field) => format!("{}_{field}", self.prefix()),
        None => self.prefix().to_owned(),
      };
      out.insert(key, json!(value));
    }
    out
  }

  fn list_fields(&self) -> Vec<&'static str> { vec![self.prefix()] }

  /// `{prefix: max}` over every matching key in `properties`.
  fn aggregate(&self, properties: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    let max = aggregate_max(properties, self.prefix(), &[EXCLUDED_MARKER]).unwrap_or(0.0);
    out.insert(self.prefix().to_owned(), number(max));
    out
  }
}

/// Character count.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthAnnotator;

impl Annotator for LengthAnnotator {
  fn prefix(&self) -> &'static str { "pdk_length" }

  fn measure(&self, content: &str, _: Option<&str>) -> Option<u64> {
    Some(content.chars().count() as u64)
  }
}

/// Whitespace-separated words after ASCII punctuation is stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCountAnnotator;

impl Annotator for WordCountAnnotator {
  fn prefix(&self) -> &'static str { "pdk_word_count" }

  fn measure(&self, content: &str, field_name: Option<&str>) -> Option<u64> {
    if field_name.is_some_and(|f| WORD_COUNT_SKIP_FIELDS.contains(&f)) {
      return None;
    }
    let stripped: String = content.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    Some(stripped.split_whitespace().count() as u64)
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The ordered set of annotators applied to every annotated field.
pub struct AnnotationRegistry {
  annotators: Vec<Box<dyn Annotator>>,
}

impl AnnotationRegistry {
  pub fn new(annotators: Vec<Box<dyn Annotator>>) -> Self { Self { annotators } }

  /// Length and word count.
  pub fn builtin() -> Self {
    Self::new(vec![Box::new(LengthAnnotator), Box::new(WordCountAnnotator)])
  }

  /// Merge every annotator's output for `content` into one map.
  pub fn annotate(&self, content: &str, field_name: Option<&str>) -> Map<String, Value> {
    let mut out = Map::new();
    for annotator in &self.annotators {
      out.extend(annotator.annotate(content, field_name));
    }
    out
  }

  pub fn list_fields(&self) -> Vec<&'static str> {
    self.annotators.iter().flat_map(|a| a.list_fields()).collect()
  }

  pub fn aggregate(&self, properties: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    for annotator in &self.annotators {
      out.extend(annotator.aggregate(properties));
    }
    out
  }
}

impl Default for AnnotationRegistry {
  fn default() -> Self { Self::builtin() }
}

impl std::fmt::Debug for AnnotationRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list().entries(self.list_fields()).finish()
  }
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Largest numeric value stored under `field_name` or `field_name_*`
/// anywhere in `value`, recursing through objects and arrays. Keys that
/// contain any of `excluded` are ignored entirely.
pub fn aggregate_max(value: &Value, field_name: &str, excluded: &[&str]) -> Option<f64> {
  let prefix = format!("{field_name}_");
  let mut best: Option<f64> = None;
  visit(value, field_name, &prefix, excluded, &mut best);
  best
}

fn visit(value: &Value, field: &str, prefix: &str, excluded: &[&str], best: &mut Option<f64>) {
  match value {
    Value::Object(map) => {
      for (key, child) in map {
        if excluded.iter().any(|marker| key.contains(marker)) {
          continue;
        }
        if key == field || key.starts_with(prefix) {
          if let Some(n) = child.as_f64() {
            *best = Some(best.map_or(n, |b| b.max(n)));
          }
        } else {
          visit(child, field, prefix, excluded, best);
        }
      }
    }
    Value::Array(items) => {
      for item in items {
        visit(item, field, prefix, excluded, best);
      }
    }
    _ => {}
  }
}

fn number(n: f64) -> Value {
  if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
    json!(n as i64)
  } else {
    json!(n)
  }
}
