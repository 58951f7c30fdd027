//! Archive access, entry routing and payload decoding.
//!
//! Every zip-based extractor owns a [`RouteTable`] mapping entry names to
//! its own category enum and hands it to [`walk`], which visits entries in
//! archive order.

use std::{
  fs::File,
  io::{BufReader, Read},
  path::Path,
};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::{Error, Result};

// ─── Routing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<C> {
  /// Known entry with nothing to import.
  Skip,
  Handle(C),
}

/// Ordered `(pattern, route)` table; the first match wins.
pub struct RouteTable<C> {
  routes: Vec<(Regex, Route<C>)>,
}

impl<C: Copy> RouteTable<C> {
  /// Compile the table. Patterns are static source text, so an invalid one
  /// is a programming error.
  pub fn new(routes: &[(&str, Route<C>)]) -> Self {
    let routes = routes
      .iter()
      .map(|(pattern, route)| (Regex::new(pattern).expect("valid route pattern"), *route))
      .collect();
    Self { routes }
  }

  pub fn resolve(&self, name: &str) -> Option<Route<C>> {
    self
      .routes
      .iter()
      .find(|(pattern, _)| pattern.is_match(name))
      .map(|(_, route)| *route)
  }
}

// ─── Zip access ──────────────────────────────────────────────────────────────

/// Upper bound on the buffer reserved from an entry's declared size; the
/// header is untrusted, so larger entries grow as they are read.
const MAX_PREALLOC: usize = 8 << 20;

fn capacity_hint(declared: u64) -> usize {
  usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_PREALLOC)
}

/// One decoded-ready archive entry.
#[derive(Debug)]
pub struct Entry {
  pub name:  String,
  pub bytes: Vec<u8>,
}

/// Random access to the entries of an open zip archive.
pub struct ZipSource {
  archive: ZipArchive<BufReader<File>>,
}

impl ZipSource {
  pub fn open(path: &Path) -> Result<Self> {
    let file = File::open(path)?;
    Ok(Self {
      archive: ZipArchive::new(BufReader::new(file))?,
    })
  }

  pub fn len(&self) -> usize { self.archive.len() }

  pub fn is_empty(&self) -> bool { self.archive.len() == 0 }

  /// Read an entry by name; `None` when the archive has no such entry.
  pub fn read_named(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match self.archive.by_name(name) {
      Ok(file) => file,
      Err(zip::result::ZipError::FileNotFound) => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
  }

  fn read_index(&mut self, index: usize) -> Result<Vec<u8>> {
    let mut file = self.archive.by_index(index)?;
    let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
  }

  fn header(&mut self, index: usize) -> Result<(String, bool, u64)> {
    let file = self.archive.by_index(index)?;
    Ok((file.name().to_owned(), file.is_dir(), file.size()))
  }
}

/// Visit every entry of the zip at `path` in archive order.
///
/// Directories and [`Route::Skip`] entries are ignored; entries that match
/// no route are logged and ignored. The first handler error aborts the walk
/// and is returned wrapped with the entry name.
pub fn walk<C, F>(service: &str, path: &Path, routes: &RouteTable<C>, mut handle: F) -> Result<()>
where
  C: Copy,
  F: FnMut(C, Entry, &mut ZipSource) -> Result<()>,
{
  let mut source = ZipSource::open(path)?;

  for index in 0..source.len() {
    let (name, is_dir, size) = source.header(index)?;
    if is_dir {
      continue;
    }

    match routes.resolve(&name) {
      None => warn!(service, entry = %name, size, "unable to process archive entry"),
      Some(Route::Skip) => debug!(service, entry = %name, "skipping archive entry"),
      Some(Route::Handle(category)) => {
        let bytes = source.read_index(index)?;
        let entry = Entry { name, bytes };
        let entry_name = entry.name.clone();
        handle(category, entry, &mut source).map_err(|e| Error::Entry {
          entry:  entry_name,
          source: Box::new(e),
        })?;
      }
    }
  }

  Ok(())
}

// ─── Decoding ────────────────────────────────────────────────────────────────

fn strip_bom(bytes: &[u8]) -> &[u8] {
  bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Parse an entry as JSON.
pub fn decode_json(bytes: &[u8]) -> Result<Value> {
  Ok(serde_json::from_slice(strip_bom(bytes))?)
}

/// Parse a Twitter-style `window.YTD.<name>.part0 = [...]` script as JSON.
/// Plain JSON is accepted unchanged.
pub fn decode_ytd(bytes: &[u8]) -> Result<Value> {
  let bytes = strip_bom(bytes);
  let trimmed = bytes.trim_ascii_start();
  let payload = if trimmed.starts_with(b"window.") {
    match trimmed.iter().position(|&b| b == b'=') {
      Some(eq) => &trimmed[eq + 1..],
      None => trimmed,
    }
  } else {
    trimmed
  };
  Ok(serde_json::from_slice(payload)?)
}

/// A header-less, flexible CSV reader over `bytes`; callers decide which
/// rows are headers.
pub fn csv_rows(bytes: &[u8]) -> csv::Reader<&[u8]> {
  csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_reader(strip_bom(bytes))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::zip_fixture;

  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  enum Cat {
    Posts,
    Profile,
  }

  #[test]
  fn declared_sizes_only_hint_the_buffer() {
    assert_eq!(capacity_hint(512), 512);
    assert_eq!(capacity_hint(u64::MAX), MAX_PREALLOC);
  }

  fn routes() -> RouteTable<Cat> {
    RouteTable::new(&[
      (r"^photos/", Route::Skip),
      (r"^posts/.*\.json$", Route::Handle(Cat::Posts)),
      (r"^profile\.json$", Route::Handle(Cat::Profile)),
    ])
  }

  #[test]
  fn first_matching_route_wins() {
    let routes = routes();
    assert_eq!(routes.resolve("posts/a.json"), Some(Route::Handle(Cat::Posts)));
    assert_eq!(routes.resolve("photos/posts/x.json"), Some(Route::Skip));
    assert_eq!(routes.resolve("unknown.txt"), None);
  }

  #[test]
  fn walk_visits_routed_entries_in_order() {
    let (_dir, path) = zip_fixture(&[
      ("posts/", b""),
      ("posts/b.json", b"[2]"),
      ("photos/p.jpg", b"\xff\xd8"),
      ("README.txt", b"hi"),
      ("posts/a.json", b"[1]"),
    ]);

    let mut seen = Vec::new();
    walk("test", &path, &routes(), |cat, entry, _| {
      seen.push((cat, entry.name, decode_json(&entry.bytes)?));
      Ok(())
    })
    .unwrap();

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, "posts/b.json");
    assert_eq!(seen[1].2, serde_json::json!([1]));
  }

  #[test]
  fn handler_errors_abort_with_entry_name() {
    let (_dir, path) = zip_fixture(&[("posts/bad.json", b"{not json"), ("posts/ok.json", b"[]")]);
    let mut calls = 0;
    let err = walk("test", &path, &routes(), |_, entry, _| {
      calls += 1;
      decode_json(&entry.bytes).map(drop)
    })
    .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(err, Error::Entry { ref entry, .. } if entry == "posts/bad.json"));
  }

  #[test]
  fn entries_can_be_read_by_name_mid_walk() {
    let (_dir, path) = zip_fixture(&[
      ("posts/a.json", b"[]"),
      ("profile.json", br#"{"username": "me"}"#),
    ]);
    walk("test", &path, &routes(), |cat, _, source| {
      if cat == Cat::Posts {
        let profile = source.read_named("profile.json")?.unwrap();
        assert_eq!(decode_json(&profile)?["username"], "me");
        assert!(source.read_named("missing.json")?.is_none());
      }
      Ok(())
    })
    .unwrap();
  }

  #[test]
  fn ytd_prefix_is_stripped() {
    let js = b"window.YTD.tweet.part0 = [ {\"tweet\": {\"id\": \"1\"}} ]";
    assert_eq!(decode_ytd(js).unwrap()[0]["tweet"]["id"], "1");
    assert_eq!(decode_ytd(b"[1]").unwrap(), serde_json::json!([1]));
  }

  #[test]
  fn csv_rows_are_flexible() {
    let bytes = b"Notes:\nFirst,Last\nAda,Lovelace,extra\n";
    let rows: Vec<_> = csv_rows(bytes).records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[2][1], "Lovelace");
  }
}
