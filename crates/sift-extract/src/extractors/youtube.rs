//! YouTube takeout (JSON history files).

use std::{path::Path, sync::LazyLock};

use serde_json::{Map, Value};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule};

use super::{EventDescription, Extractor, owned_by};
use crate::{
  Result,
  archive::{Route, RouteTable, decode_json, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "youtube";

const TIMESTAMP: &[TimestampFormat] = &[TimestampFormat::Iso8601, TimestampFormat::UnixSeconds];

const SEARCH_RULES: &[FieldRule] = &[
  FieldRule::new(&["title"], Action::SealAnnotated),
  FieldRule::new(&["titleUrl"], Action::SealWithLength),
];

const DETAIL_RULES: &[FieldRule] = &[
  FieldRule::new(&["snippet"], Action::SealJson),
  FieldRule::new(&["contentDetails"], Action::SealJson),
];

#[derive(Debug, Clone, Copy)]
enum Category {
  Watches,
  Searches,
  Uploads,
  Likes,
}

static ROUTES: LazyLock<RouteTable<Category>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"(^|/)watch-history\.json$", Route::Handle(Category::Watches)),
    (r"(^|/)search-history\.json$", Route::Handle(Category::Searches)),
    (r"(^|/)uploads\.json$", Route::Handle(Category::Uploads)),
    (r"(^|/)likes\.json$", Route::Handle(Category::Likes)),
  ])
});

pub struct YouTube;

impl Extractor for YouTube {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |category, entry, _| {
      let payload = decode_json(&entry.bytes)?;
      let items = fields::as_array(&payload, &entry.name)?;
      match category {
        Category::Watches => import_watches(ctx, items),
        Category::Searches => import_searches(ctx, items),
        Category::Uploads => import_videos(ctx, items, "upload", "upload", 1.0, false),
        Category::Likes => import_videos(ctx, items, "like", "reaction", 0.5, true),
      }
    })
  }

  fn describe_event(&self, generator_id: &str, _properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "YouTube", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];

    Some(match category {
      "watch" => EventDescription::new("YouTube", "Watched Video").incoming().media("Video"),
      "search" => EventDescription::new("YouTube", "Search").incoming().media("Search"),
      "upload" => EventDescription::new("YouTube", "Video Upload").outgoing().media("Video"),
      "like" => EventDescription::new("YouTube", "Positive Reaction").outgoing().media("Reaction"),
      _ => described,
    })
  }
}

/// Watched titles stay readable; only their annotations are added.
fn import_watches(ctx: &mut ImportContext<'_>, watches: &[Value]) -> Result<()> {
  for watch in watches {
    let at = ctx.timestamp(fields::require(watch, "time")?, TIMESTAMP)?;
    if !ctx.include(at, watch) {
      continue;
    }

    let mut point = watch.as_object().cloned().unwrap_or_default();
    if let Some(title) = watch.get("title").and_then(Value::as_str) {
      ctx.sanitizer().annotate(&mut point, "title", title);
    }

    ctx.emit(generator_id(SERVICE, "watch"), point, at)?;
    ctx.engage(Engagement::new(SERVICE, "watch").outgoing(0.5), at)?;
  }
  Ok(())
}

fn import_searches(ctx: &mut ImportContext<'_>, searches: &[Value]) -> Result<()> {
  for search in searches {
    let at = ctx.timestamp(fields::require(search, "time")?, TIMESTAMP)?;
    if !ctx.include(at, search) {
      continue;
    }

    let mut search = search.clone();
    ctx.sanitizer().apply(&mut search, SEARCH_RULES)?;
    ctx.emit_value(generator_id(SERVICE, "search"), search, at)?;
    ctx.engage(Engagement::new(SERVICE, "search").outgoing(1.0), at)?;
  }
  Ok(())
}

/// Uploads and likes share the YouTube Data API resource shape.
fn import_videos(
  ctx: &mut ImportContext<'_>,
  videos: &[Value],
  category: &str,
  kind: &str,
  score: f64,
  title_length: bool,
) -> Result<()> {
  for video in videos {
    let snippet = fields::require(video, "snippet")?;
    let at = ctx.timestamp(fields::require(snippet, "publishedAt")?, TIMESTAMP)?;
    if !ctx.include(at, video) {
      continue;
    }

    let title = fields::require_str(snippet, "title")?.to_owned();
    let mut video = video.clone();
    let sanitizer = ctx.sanitizer();
    {
      let point = fields::as_object_mut(&mut video, category)?;
      sanitizer.seal_annotated(point, "title", &title)?;
      if title_length {
        sanitizer.length(point, "title", &title);
      }
    }
    sanitizer.apply(&mut video, DETAIL_RULES)?;

    ctx.emit_value(generator_id(SERVICE, category), video, at)?;
    ctx.engage(Engagement::new(SERVICE, kind).outgoing(score), at)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use serde_json::json;

  use super::*;
  use crate::testing::import_zip;

  #[test]
  fn watch_titles_are_annotated_in_place() {
    let history = json!([{
      "title": "Watched Rust in production",
      "titleUrl": "https://www.youtube.com/watch?v=1",
      "time": "2021-02-03T04:05:06.789Z",
    }]);
    let out = import_zip(&YouTube, &[
      ("Takeout/YouTube/history/watch-history.json", history.to_string().as_bytes()),
    ])
    .unwrap();

    let watch = out.generator("pdk-external-youtube-watch")[0];
    assert_eq!(watch.properties["title"], "Watched Rust in production");
    assert_eq!(watch.properties["pdk_word_count_title"], 4);
    assert_eq!(watch.occurred_at.timestamp(), Utc.with_ymd_and_hms(2021, 2, 3, 4, 5, 6).unwrap().timestamp());
  }

  #[test]
  fn searches_seal_title_and_url() {
    let history = json!([{
      "title": "Searched for sourdough",
      "titleUrl": "https://www.youtube.com/results?search_query=sourdough",
      "time": "2021-02-03T04:05:06Z",
    }]);
    let out = import_zip(&YouTube, &[
      ("Takeout/YouTube/history/search-history.json", history.to_string().as_bytes()),
    ])
    .unwrap();

    let search = &out.generator("pdk-external-youtube-search")[0].properties;
    assert!(search.get("title").is_none());
    assert!(search.get("titleUrl").is_none());
    assert_eq!(out.open(&search["pdk_encrypted_title"]), "Searched for sourdough");
    assert!(search["pdk_length_titleUrl"].as_u64().unwrap() > 0);
  }

  #[test]
  fn likes_seal_the_api_resource() {
    let likes = json!([{
      "kind": "youtube#playlistItem",
      "snippet": {"title": "Great talk", "publishedAt": "2020-11-12T13:14:15Z"},
      "contentDetails": {"videoId": "xyz"},
    }]);
    let out = import_zip(&YouTube, &[("Takeout/YouTube/playlists/likes.json", likes.to_string().as_bytes())]).unwrap();

    let like = &out.generator("pdk-external-youtube-like")[0].properties;
    assert_eq!(like["kind"], "youtube#playlistItem");
    assert!(like.get("snippet").is_none());
    assert_eq!(like["pdk_length_title"], 10);
    assert!(out.open(&like["pdk_encrypted_contentDetails"]).contains("xyz"));

    let described = YouTube.describe_event("pdk-external-youtube-like", like).unwrap();
    assert_eq!(described.event, "Positive Reaction");
  }
}
