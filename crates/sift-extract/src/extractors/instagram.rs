//! Instagram data download (JSON).

use std::{collections::BTreeSet, path::Path, sync::LazyLock};

use chrono_tz::US;
use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule};
use tracing::warn;

use super::{Direction, EventDescription, Extractor, owned_by};
use crate::{
  Error, Result,
  archive::{Route, RouteTable, ZipSource, decode_json, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "instagram";

const PROFILE_ENTRIES: &[&str] = &["profile.json", "personal_information/personal_information.json"];

/// Comments and uploads carry wall-clock Pacific time without an offset.
const PACIFIC: &[TimestampFormat] = &[
  TimestampFormat::Zoned("%Y-%m-%dT%H:%M:%S", US::Pacific),
  TimestampFormat::UnixSeconds,
];

const INSTANT: &[TimestampFormat] = &[TimestampFormat::Iso8601, TimestampFormat::UnixSeconds];

const MEDIA_RULES: &[FieldRule] = &[
  FieldRule::new(&["caption"], Action::SealAnnotated),
  FieldRule::new(&["location"], Action::SealAnnotated),
];

#[derive(Debug, Clone, Copy)]
enum Category {
  Profile,
  Comments,
  Media,
  Likes,
  SeenContent,
  Searches,
  LegacyMessages,
  ThreadMessages,
}

static ROUTES: LazyLock<RouteTable<Category>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"(?i)\.(jpe?g|png|gif|webp|heic|mp4|mov|m4a)$", Route::Skip),
    (r"^profile\.json$", Route::Handle(Category::Profile)),
    (r"^personal_information/personal_information\.json$", Route::Handle(Category::Profile)),
    (r"^comments\.json", Route::Handle(Category::Comments)),
    (r"^media\.json", Route::Handle(Category::Media)),
    (r"^likes\.json", Route::Handle(Category::Likes)),
    (r"^seen_content\.json", Route::Handle(Category::SeenContent)),
    (r"^searches\.json", Route::Handle(Category::Searches)),
    (r"^messages\.json", Route::Handle(Category::LegacyMessages)),
    (r"^messages/inbox/[^/]+/message_\d+\.json$", Route::Handle(Category::ThreadMessages)),
  ])
});

// ── Subject identity ─────────────────────────────────────────────────────

/// Usernames and display names that identify the archive's owner.
#[derive(Debug, Default)]
struct Identity {
  names: BTreeSet<String>,
}

impl Identity {
  fn absorb(&mut self, profile: &Value) {
    let legacy = ["username", "name"].into_iter().filter_map(|k| fields::non_empty(profile, k));
    let current = ["Username", "Name"].into_iter().filter_map(|k| {
      profile
        .pointer(&format!("/profile_user/0/string_map_data/{k}/value"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    });
    self.names.extend(legacy.chain(current).map(str::to_owned));
  }

  fn direction(&self, sender: &str) -> Direction {
    if self.names.contains(sender) {
      Direction::Outgoing
    } else {
      Direction::Incoming
    }
  }

  /// Load from the archive's profile entries when messages arrive first.
  fn load(source: &mut ZipSource) -> Result<Self> {
    let mut identity = Self::default();
    for name in PROFILE_ENTRIES {
      if let Some(bytes) = source.read_named(name)? {
        identity.absorb(&decode_json(&bytes)?);
      }
    }
    if identity.names.is_empty() {
      warn!(service = SERVICE, "no profile entry; treating every message as incoming");
    }
    Ok(identity)
  }
}

// ── Extractor ────────────────────────────────────────────────────────────

pub struct Instagram;

impl Extractor for Instagram {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    let mut identity: Option<Identity> = None;

    walk(SERVICE, path, &ROUTES, |category, entry, source| {
      let payload = decode_json(&entry.bytes)?;
      match category {
        Category::Profile => {
          identity.get_or_insert_with(Identity::default).absorb(&payload);
          Ok(())
        }
        Category::Comments => import_comments(ctx, &payload),
        Category::Media => import_media(ctx, &payload),
        Category::Likes => import_likes(ctx, &payload),
        Category::SeenContent => import_seen(ctx, &payload),
        Category::Searches => import_searches(ctx, &payload),
        Category::LegacyMessages | Category::ThreadMessages => {
          if identity.is_none() {
            identity = Some(Identity::load(source)?);
          }
          let identity = identity.get_or_insert_with(Identity::default);
          let messages = Conversation::sniff(category, &payload)?;
          import_messages(ctx, identity, messages)
        }
      }
    })
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Instagram", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];

    Some(match category {
      "comment" => EventDescription::new("Instagram", "Added Comment").outgoing().media("Text"),
      "photo" => EventDescription::new("Instagram", "Photo Upload").outgoing().media("Image"),
      "video" => EventDescription::new("Instagram", "Video Upload").outgoing().media("Video"),
      "direct-message" => {
        let direction = match properties.get("pdk_direction").and_then(Value::as_str) {
          Some("outgoing") => Some(Direction::Outgoing),
          Some("incoming") => Some(Direction::Incoming),
          _ => None,
        };
        EventDescription::new("Instagram", "Direct Message").direction(direction).media("Text")
      }
      _ => described,
    })
  }
}

fn import_comments(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  let Some(groups) = payload.as_object() else {
    return Ok(());
  };

  for comment in groups.values().filter_map(Value::as_array).flatten() {
    let raw_at = comment.get(0).ok_or_else(|| Error::MissingField("comment[0]".into()))?;
    let at = ctx.timestamp(raw_at, PACIFIC)?;
    if !ctx.include(at, comment) {
      continue;
    }

    let text = comment.get(1).map(fields::text).unwrap_or_default();
    let profile = comment.get(2).map(fields::text).unwrap_or_default();

    let sanitizer = ctx.sanitizer();
    let mut point = Map::new();
    sanitizer.seal_annotated(&mut point, "comment", &text)?;
    sanitizer.hash(&mut point, "profile", &profile);
    sanitizer.seal(&mut point, "profile", &profile)?;

    ctx.emit(generator_id(SERVICE, "comment"), point, at)?;
    ctx.engage(Engagement::new(SERVICE, "comment").outgoing(1.0), at)?;
  }
  Ok(())
}

fn import_media(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for (section, category) in [("photos", "photo"), ("videos", "video")] {
    for item in fields::section(payload, section)? {
      let at = ctx.timestamp(fields::require(item, "taken_at")?, PACIFIC)?;
      if !ctx.include(at, item) {
        continue;
      }

      let mut item = item.clone();
      ctx.sanitizer().apply(&mut item, MEDIA_RULES)?;
      ctx.emit_value(generator_id(SERVICE, category), item, at)?;
      ctx.engage(Engagement::new(SERVICE, category).outgoing(1.0), at)?;
    }
  }
  Ok(())
}

fn import_likes(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  if !payload.is_object() {
    return Ok(());
  }

  for (section, content_type) in [("media_likes", "media"), ("comment_likes", "comment")] {
    for like in fields::section(payload, section)? {
      let raw_at = like.get(0).ok_or_else(|| Error::MissingField(format!("{section}[0]")))?;
      let at = ctx.timestamp(raw_at, INSTANT)?;
      if !ctx.include(at, like) {
        continue;
      }

      let target = like.get(1).map(fields::text).unwrap_or_default();
      let mut point = Map::new();
      point.insert("timestamp".into(), raw_at.clone());
      ctx.sanitizer().hash(&mut point, "target", &target);
      point.insert("content_type".into(), content_type.into());
      point.insert("reaction".into(), "like".into());

      ctx.emit(generator_id(SERVICE, "reaction"), point, at)?;
      ctx.engage(Engagement::new(SERVICE, "reaction").outgoing(0.5), at)?;
    }
  }
  Ok(())
}

/// One timestamped, hashed target such as a visited profile or a search.
fn import_targets(
  ctx: &mut ImportContext<'_>,
  items: &[Value],
  time_key: &str,
  target_key: &str,
  category: &str,
  kind: &str,
) -> Result<()> {
  for item in items {
    let raw_at = fields::require(item, time_key)?;
    let at = ctx.timestamp(raw_at, INSTANT)?;
    if !ctx.include(at, item) {
      continue;
    }

    let mut point = Map::new();
    point.insert("timestamp".into(), raw_at.clone());
    ctx.sanitizer().hash(&mut point, "target", fields::require_str(item, target_key)?);

    ctx.emit(generator_id(SERVICE, category), point, at)?;
    ctx.engage(Engagement::new(SERVICE, kind).outgoing(0.5), at)?;
  }
  Ok(())
}

fn import_seen(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  if !payload.is_object() {
    return Ok(());
  }
  let chaining = fields::section(payload, "chaining_seen")?;
  import_targets(ctx, chaining, "timestamp", "username", "page-visit", "page")?;
  let ads = fields::section(payload, "ads_clicked")?;
  import_targets(ctx, ads, "timestamp", "caption", "ad-clicked", "advertising")
}

fn import_searches(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  if !payload.is_object() {
    return Ok(());
  }
  let searches = fields::section(payload, "main_search_history")?;
  import_targets(ctx, searches, "time", "search_click", "search-click", "search")
}

// ── Messages ─────────────────────────────────────────────────────────────

/// A message normalized across the two export layouts.
struct Message<'v> {
  sender:    &'v str,
  text:      Option<&'v str>,
  media_url: Option<&'v str>,
  time:      &'v Value,
  time_key:  &'static str,
}

struct Conversation<'v> {
  participants: Vec<&'v str>,
  messages:     Vec<Message<'v>>,
}

impl<'v> Conversation<'v> {
  /// `messages.json` holds a list of conversations with string
  /// participants; `messages/inbox/<thread>/message_N.json` holds one thread
  /// with `{name}` participants and millisecond timestamps.
  fn sniff(category: Category, payload: &'v Value) -> Result<Vec<Self>> {
    match category {
      Category::LegacyMessages => {
        let Some(conversations) = payload.as_array() else {
          return Ok(Vec::new());
        };
        conversations.iter().map(Self::legacy).collect()
      }
      _ => Ok(vec![Self::thread(payload)?]),
    }
  }

  fn legacy(conversation: &'v Value) -> Result<Self> {
    let participants = fields::require_array(conversation, "participants")?
      .iter()
      .filter_map(Value::as_str)
      .collect();
    let messages = fields::require_array(conversation, "conversation")?
      .iter()
      .map(|m| {
        Ok(Message {
          sender:    fields::require_str(m, "sender")?,
          text:      m.get("text").and_then(Value::as_str),
          media_url: m.get("media_url").and_then(Value::as_str),
          time:      fields::require(m, "created_at")?,
          time_key:  "created_at",
        })
      })
      .collect::<Result<_>>()?;
    Ok(Self { participants, messages })
  }

  fn thread(thread: &'v Value) -> Result<Self> {
    let participants = fields::section(thread, "participants")?
      .iter()
      .filter_map(|p| p.get("name").and_then(Value::as_str))
      .collect();
    let messages = fields::section(thread, "messages")?
      .iter()
      .map(|m| {
        Ok(Message {
          sender:    fields::require_str(m, "sender_name")?,
          text:      m.get("content").and_then(Value::as_str),
          media_url: m.pointer("/photos/0/uri").and_then(Value::as_str),
          time:      fields::require(m, "timestamp_ms")?,
          time_key:  "timestamp_ms",
        })
      })
      .collect::<Result<_>>()?;
    Ok(Self { participants, messages })
  }
}

const MESSAGE_TIME: &[TimestampFormat] = &[
  TimestampFormat::Iso8601,
  TimestampFormat::UnixMillis,
];

fn import_messages(ctx: &mut ImportContext<'_>, identity: &Identity, conversations: Vec<Conversation<'_>>) -> Result<()> {
  for conversation in conversations {
    let sanitizer = ctx.sanitizer();
    let others: Vec<Value> = conversation
      .participants
      .iter()
      .filter(|p| !identity.names.contains(**p))
      .map(|p| Value::String(sanitizer.hash_text(p)))
      .collect();
    let recipients = conversation.participants.len().saturating_sub(1);

    for message in &conversation.messages {
      let at = ctx.timestamp(message.time, MESSAGE_TIME)?;
      let raw = json!({"sender": message.sender, "time": message.time});
      if !ctx.include(at, &raw) {
        continue;
      }

      let direction = identity.direction(message.sender);
      let mut point = Map::new();
      point.insert("pdk_recipients_count".into(), json!(recipients));
      sanitizer.hash(&mut point, "senderId", message.sender);
      sanitizer.seal(&mut point, "sender", message.sender)?;
      point.insert("pdk_hashed_participants".into(), Value::Array(others.clone()));
      point.insert(message.time_key.into(), message.time.clone());
      if let Some(text) = message.text {
        sanitizer.seal_annotated(&mut point, "text", text)?;
      }
      if let Some(url) = message.media_url {
        sanitizer.seal(&mut point, "media_url", url)?;
      }
      point.insert(
        "pdk_direction".into(),
        match direction {
          Direction::Outgoing => "outgoing",
          Direction::Incoming => "incoming",
        }
        .into(),
      );

      ctx.emit(generator_id(SERVICE, "direct-message"), point, at)?;
      let engagement = Engagement::new(SERVICE, "message");
      let engagement = match direction {
        Direction::Outgoing => engagement.outgoing(1.0),
        Direction::Incoming => engagement.incoming(1.0),
      };
      ctx.engage(engagement, at)?;
    }
  }
  Ok(())
}
