//! Facebook "Download Your Information" JSON exports.

use std::{path::Path, sync::LazyLock};

use serde_json::{Map, Value};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule};

use super::{EventDescription, Extractor, owned_by};
use crate::{
  Error, Result,
  archive::{Route, RouteTable, decode_json, walk},
  context::ImportContext,
  fields::{self, contains_key_deep},
  timestamp::TimestampFormat,
};

const SERVICE: &str = "facebook";

const TIMESTAMP: &[TimestampFormat] = &[TimestampFormat::UnixSeconds, TimestampFormat::Iso8601];

#[derive(Debug, Clone, Copy)]
enum Category {
  Comments,
  Posts,
  Viewed,
  Visited,
  PageLikes,
  PostReactions,
}

static ROUTES: LazyLock<RouteTable<Category>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"^photos_and_videos/", Route::Skip),
    (r"^comments/.*\.json", Route::Handle(Category::Comments)),
    (r"^posts/.*\.json", Route::Handle(Category::Posts)),
    (r"^about_you/viewed\.json", Route::Handle(Category::Viewed)),
    (r"^about_you/visited\.json", Route::Handle(Category::Visited)),
    (r"^likes_and_reactions/pages\.json", Route::Handle(Category::PageLikes)),
    (r"^likes_and_reactions/posts_and_comments\.json", Route::Handle(Category::PostReactions)),
  ])
});

// ── Field rules ──────────────────────────────────────────────────────────

const COMMENT_RULES: &[FieldRule] = &[
  FieldRule::new(&["title"], Action::SealAnnotated),
  FieldRule::new(&["data", "*", "comment", "comment"], Action::SealAnnotated),
  FieldRule::new(&["data", "*", "comment", "author"], Action::SealAndHash),
];

const POST_RULES: &[FieldRule] = &[
  FieldRule::new(&["title"], Action::SealAnnotated),
  FieldRule::new(&["data", "*", "post"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "event", "name"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "event", "description"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "event", "place"], Action::SealJsonAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "external_context", "url"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "media", "title"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "media", "description"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "media", "uri"], Action::SealAnnotated),
  FieldRule::new(&["attachments", "*", "data", "*", "media", "media_metadata"], Action::SealJson),
  FieldRule::new(&["attachments", "*", "data", "*", "place"], Action::SealJson),
];

const ACTIVITY_RULES: &[FieldRule] = &[
  FieldRule::new(&["data", "uri"], Action::SealAndHash),
  FieldRule::new(&["data", "name"], Action::SealAndHashAnnotated),
];

const ARTICLE_RULES: &[FieldRule] = &[
  FieldRule::new(&["data", "uri"], Action::SealAndHash),
  FieldRule::new(&["data", "share"], Action::SealAndHash),
  FieldRule::new(&["data", "name"], Action::SealAndHashAnnotated),
];

const PAGE_LIKE_RULES: &[FieldRule] = &[FieldRule::new(&["name"], Action::SealAnnotated)];

const REACTION_RULES: &[FieldRule] = &[
  FieldRule::new(&["title"], Action::SealAnnotated),
  FieldRule::new(&["data", "*", "reaction", "actor"], Action::SealAnnotated),
];

/// How one kind of activity-log entry is recorded.
struct Activity {
  category: &'static str,
  kind:     &'static str,
  rules:    &'static [FieldRule],
  /// Field under `data` holding a watch duration in seconds.
  duration: Option<&'static str>,
}

const fn activity(category: &'static str, kind: &'static str) -> Activity {
  Activity { category, kind, rules: ACTIVITY_RULES, duration: None }
}

const SHOWS: Activity = activity("watch", "video");
const TIME_VIEWED: Activity = Activity { duration: Some("watch_position_seconds"), ..activity("watch", "video") };
const LIVE_VIDEOS: Activity = activity("watch", "video");
const ARTICLES: Activity = Activity { rules: ARTICLE_RULES, ..activity("link", "link") };
const MARKETPLACE: Activity = activity("market", "shopping");
const ADS: Activity = activity("ad-viewed", "advertising");

const VISITS: &[(&str, Activity)] = &[
  ("Profile visits", activity("profile-visit", "profile")),
  ("Page visits", activity("page-visit", "page")),
  ("Events visited", activity("event-visit", "event")),
  ("Groups visited", activity("group-visit", "group")),
];

// ── Post file shapes ─────────────────────────────────────────────────────

/// The three layouts `posts/*.json` has used over time.
enum PostsFile {
  /// A list of the subject's own posts.
  Own(Vec<Value>),
  /// A single post object.
  Single(Value),
  /// `wall_posts_sent_to_you.activity_log_data`.
  Wall(Vec<Value>),
}

impl PostsFile {
  fn sniff(payload: Value) -> Result<Self> {
    match payload {
      Value::Array(posts) => Ok(Self::Own(posts)),
      Value::Object(mut map) => {
        let wall = map
          .get_mut("wall_posts_sent_to_you")
          .and_then(|w| w.get_mut("activity_log_data"))
          .map(Value::take);
        match wall {
          Some(Value::Array(posts)) => Ok(Self::Wall(posts)),
          Some(_) => Err(Error::UnexpectedShape {
            field:    "wall_posts_sent_to_you.activity_log_data".into(),
            expected: "array",
          }),
          None if map.contains_key("timestamp") => Ok(Self::Single(Value::Object(map))),
          None => Err(Error::UnexpectedShape {
            field:    "posts".into(),
            expected: "wall posts or a single post",
          }),
        }
      }
      _ => Err(Error::UnexpectedShape {
        field:    "posts".into(),
        expected: "array or object",
      }),
    }
  }

  fn source(&self) -> &'static str {
    match self {
      Self::Own(_) => "user",
      Self::Single(_) | Self::Wall(_) => "others",
    }
  }

  fn into_posts(self) -> Vec<Value> {
    match self {
      Self::Own(posts) | Self::Wall(posts) => posts,
      Self::Single(post) => vec![post],
    }
  }
}

// ── Extractor ────────────────────────────────────────────────────────────

pub struct Facebook;

impl Extractor for Facebook {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |category, entry, _| {
      let payload = decode_json(&entry.bytes)?;
      match category {
        Category::Comments => import_comments(ctx, &payload),
        Category::Posts => import_posts(ctx, payload),
        Category::Viewed => import_viewed(ctx, &payload),
        Category::Visited => import_visited(ctx, &payload),
        Category::PageLikes => import_page_likes(ctx, &payload),
        Category::PostReactions => import_reactions(ctx, &payload),
      }
    })
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Facebook", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];
    let props = Value::Object(properties.clone());

    Some(match category {
      "comment" => EventDescription::new("Facebook", "Upload Comment").outgoing().media("Text"),
      "post" => {
        let media = if contains_key_deep(&props, "pdk_encrypted_place") {
          "Location"
        } else if contains_key_deep(&props, "pdk_encrypted_media_metadata") {
          "Multimedia"
        } else if contains_key_deep(&props, "pdk_encrypted_url") {
          "Link"
        } else {
          "Text"
        };
        EventDescription::new("Facebook", "Upload Post").outgoing().media(media)
      }
      "reaction" => EventDescription::new("Facebook", "Reaction").outgoing(),
      _ => described,
    })
  }
}

fn import_comments(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for comment in fields::require_array(payload, "comments")? {
    let at = ctx.timestamp(fields::require(comment, "timestamp")?, TIMESTAMP)?;
    if !ctx.include(at, comment) {
      continue;
    }

    let mut comment = comment.clone();
    ctx.sanitizer().apply(&mut comment, COMMENT_RULES)?;
    ctx.emit_value(generator_id(SERVICE, "comment"), comment, at)?;
    ctx.engage(Engagement::new(SERVICE, "comment").outgoing(1.0), at)?;
  }
  Ok(())
}

fn import_posts(ctx: &mut ImportContext<'_>, payload: Value) -> Result<()> {
  let file = PostsFile::sniff(payload)?;
  let source = file.source();

  for mut post in file.into_posts() {
    let at = ctx.timestamp(fields::require(&post, "timestamp")?, TIMESTAMP)?;
    if !ctx.include(at, &post) {
      continue;
    }

    ctx.sanitizer().apply(&mut post, POST_RULES)?;
    fields::as_object_mut(&mut post, "post")?.insert("pdk_facebook_source".into(), source.into());
    ctx.emit_value(generator_id(SERVICE, "post"), post, at)?;
    ctx.engage(Engagement::new(SERVICE, "post").outgoing(1.0), at)?;
  }
  Ok(())
}

fn import_viewed(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for thing in fields::require_array(payload, "viewed_things")? {
    match fields::require_str(thing, "name")? {
      "Facebook Watch Videos and Shows" => {
        for child in fields::section(thing, "children")? {
          match fields::require_str(child, "name")? {
            "Shows" => import_activity(ctx, child, &SHOWS)?,
            "Time Viewed" => import_activity(ctx, child, &TIME_VIEWED)?,
            _ => {}
          }
        }
      }
      "Facebook Live Videos" => import_activity(ctx, thing, &LIVE_VIDEOS)?,
      "Articles" => import_activity(ctx, thing, &ARTICLES)?,
      "Marketplace Interactions" => {
        for child in fields::section(thing, "children")? {
          if fields::require_str(child, "name")? == "Marketplace Items" {
            import_activity(ctx, child, &MARKETPLACE)?;
          }
        }
      }
      "Ads" => import_activity(ctx, thing, &ADS)?,
      _ => {}
    }
  }
  Ok(())
}

fn import_visited(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for thing in fields::require_array(payload, "visited_things")? {
    let name = fields::require_str(thing, "name")?;
    if let Some((_, activity)) = VISITS.iter().find(|(label, _)| *label == name) {
      import_activity(ctx, thing, activity)?;
    }
  }
  Ok(())
}

fn import_activity(ctx: &mut ImportContext<'_>, group: &Value, activity: &Activity) -> Result<()> {
  for entry in fields::section(group, "entries")? {
    let at = ctx.timestamp(fields::require(entry, "timestamp")?, TIMESTAMP)?;
    if !ctx.include(at, entry) {
      continue;
    }

    let duration = activity
      .duration
      .and_then(|field| entry.get("data")?.get(field)?.as_f64())
      .unwrap_or(0.0);

    let mut entry = entry.clone();
    ctx.sanitizer().apply(&mut entry, activity.rules)?;
    ctx.emit_value(generator_id(SERVICE, activity.category), entry, at)?;
    ctx.engage(
      Engagement::new(SERVICE, activity.kind).outgoing(0.0).duration(duration),
      at,
    )?;
  }
  Ok(())
}

fn import_page_likes(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for like in fields::require_array(payload, "page_likes")? {
    let at = ctx.timestamp(fields::require(like, "timestamp")?, TIMESTAMP)?;
    if !ctx.include(at, like) {
      continue;
    }

    let mut like = like.clone();
    ctx.sanitizer().apply(&mut like, PAGE_LIKE_RULES)?;
    let map = fields::as_object_mut(&mut like, "page_likes")?;
    map.insert("content_type".into(), "page".into());
    map.insert("reaction".into(), "like".into());

    ctx.emit_value(generator_id(SERVICE, "reaction"), like, at)?;
    ctx.engage(Engagement::new(SERVICE, "reaction").outgoing(0.5), at)?;
  }
  Ok(())
}

fn reaction_target(title: &str) -> &'static str {
  if title.contains("'s post") {
    "post"
  } else if title.contains("'s comment") {
    "comment"
  } else {
    "unknown"
  }
}

fn import_reactions(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for reaction in fields::require_array(payload, "reactions")? {
    let at = ctx.timestamp(fields::require(reaction, "timestamp")?, TIMESTAMP)?;
    if !ctx.include(at, reaction) {
      continue;
    }

    let content_type = reaction.get("title").and_then(Value::as_str).map(reaction_target);

    let mut reaction = reaction.clone();
    for item in reaction
      .get_mut("data")
      .and_then(Value::as_array_mut)
      .into_iter()
      .flatten()
    {
      if let Some(Value::String(kind)) = item.pointer_mut("/reaction/reaction") {
        *kind = kind.to_lowercase();
      }
    }
    ctx.sanitizer().apply(&mut reaction, REACTION_RULES)?;
    if let Some(content_type) = content_type {
      fields::as_object_mut(&mut reaction, "reactions")?.insert("content_type".into(), content_type.into());
    }

    ctx.emit_value(generator_id(SERVICE, "reaction"), reaction, at)?;
    ctx.engage(Engagement::new(SERVICE, "reaction").outgoing(0.5), at)?;
  }
  Ok(())
}
