//! Fixtures shared by the extractor tests.

use std::{cell::RefCell, io::Write, path::PathBuf};

use chrono_tz::Tz;
use sift_core::{buffer::BatchBuffer, policy::IncludeAll, record::NewRecord, store::RecordSink};
use sift_sanitize::{Sanitizer, crypto::generate_keypair};
use tempfile::TempDir;
use zip::{ZipWriter, write::FileOptions};

use crate::{Result, context::ImportContext, extractors::Extractor};

pub fn zip_fixture(entries: &[(&str, &[u8])]) -> (TempDir, PathBuf) {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("export.zip");
  let file = std::fs::File::create(&path).unwrap();
  let mut zip = ZipWriter::new(file);
  for (name, bytes) in entries {
    if name.ends_with('/') {
      zip.add_directory(*name, FileOptions::default()).unwrap();
    } else {
      zip.start_file(*name, FileOptions::default()).unwrap();
      zip.write_all(bytes).unwrap();
    }
  }
  zip.finish().unwrap();
  (dir, path)
}

pub fn file_fixture(name: &str, bytes: &[u8]) -> (TempDir, PathBuf) {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join(name);
  std::fs::write(&path, bytes).unwrap();
  (dir, path)
}

/// Collects every flushed record in memory.
#[derive(Default)]
pub struct MemorySink {
  pub records: RefCell<Vec<NewRecord>>,
}

impl RecordSink for MemorySink {
  fn write_batch(
    &self,
    records: Vec<NewRecord>,
  ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    let n = records.len();
    self.records.borrow_mut().extend(records);
    Ok(n)
  }
}

/// Output of a test import.
pub struct Imported {
  pub records: Vec<NewRecord>,
  pub private_key: String,
}

impl Imported {
  pub fn generator(&self, generator_id: &str) -> Vec<&NewRecord> {
    self.records.iter().filter(|r| r.generator_id == generator_id).collect()
  }

  pub fn open(&self, sealed: &serde_json::Value) -> String {
    sift_sanitize::crypto::open_sealed_text(&self.private_key, sealed.as_str().unwrap()).unwrap()
  }
}

/// Run `extractor` over `path` with encryption enabled and everything kept.
pub fn import_path(extractor: &dyn Extractor, path: &std::path::Path) -> Result<Imported> {
  import_path_in(extractor, path, Tz::UTC)
}

pub fn import_path_in(extractor: &dyn Extractor, path: &std::path::Path, zone: Tz) -> Result<Imported> {
  let (public, private) = generate_keypair();
  let sanitizer = Sanitizer::new(&public).unwrap();
  let sink = MemorySink::default();
  {
    let buffer = BatchBuffer::new(&sink, 10);
    let mut ctx = ImportContext::new("subject-1", &sanitizer, &IncludeAll, buffer, zone);
    extractor.import(&mut ctx, path)?;
    ctx.finish()?;
  }
  Ok(Imported {
    records:     sink.records.into_inner(),
    private_key: private,
  })
}

/// Build a zip from `entries` and import it.
pub fn import_zip(extractor: &dyn Extractor, entries: &[(&str, &[u8])]) -> Result<Imported> {
  let (_dir, path) = zip_fixture(entries);
  import_path(extractor, &path)
}
