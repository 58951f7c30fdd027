//! Snapchat "My Data" download.
//!
//! Most Snapchat files are an object of named sections, each a list of flat
//! objects with title-cased keys. Those sections are described by
//! [`Section`] tables; shared stories and story views have their own
//! handlers.

use std::{path::Path, sync::LazyLock};

use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::Sanitizer;

use super::{Direction, EventDescription, Extractor, owned_by};
use crate::{
  Result,
  archive::{Route, RouteTable, decode_json, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "snapchat";

const TIMESTAMP: &[TimestampFormat] = &[
  TimestampFormat::ZoneName("%Y-%m-%d %H:%M:%S %Z"),
  TimestampFormat::Iso8601,
];

/// How one list of flat objects becomes records.
struct Section {
  key:       &'static str,
  category:  &'static str,
  time:      &'static str,
  kind:      &'static str,
  direction: Direction,
  /// `(source key, field)` pairs that are sealed and hashed.
  sensitive: &'static [(&'static str, &'static str)],
  /// Whether sensitive fields also record their length.
  lengths:   bool,
  /// `(source key, field)` pairs copied through unchanged.
  plain:     &'static [(&'static str, &'static str)],
}

const CHATS: &[Section] = &[
  Section {
    key:       "Received Chat History",
    category:  "chat-received",
    time:      "Created",
    kind:      "message",
    direction: Direction::Incoming,
    sensitive: &[("From", "from")],
    lengths:   true,
    plain:     &[("Media Type", "media_type"), ("Created", "created")],
  },
  Section {
    key:       "Sent Chat History",
    category:  "chat-sent",
    time:      "Created",
    kind:      "message",
    direction: Direction::Outgoing,
    sensitive: &[("To", "to")],
    lengths:   true,
    plain:     &[("Media Type", "media_type"), ("Created", "created")],
  },
];

const SNAPS: &[Section] = &[
  Section {
    key:       "Received Snap History",
    category:  "snap-received",
    time:      "Created",
    kind:      "message",
    direction: Direction::Incoming,
    sensitive: &[("From", "from")],
    lengths:   true,
    plain:     &[("Created", "create_time"), ("Media Type", "media_type")],
  },
  Section {
    key:       "Sent Snap History",
    category:  "snap-sent",
    time:      "Created",
    kind:      "message",
    direction: Direction::Outgoing,
    sensitive: &[("To", "to")],
    lengths:   true,
    plain:     &[("Created", "create_time"), ("Media Type", "media_type")],
  },
];

const MEMORIES: &[Section] = &[Section {
  key:       "Saved Media",
  category:  "memory-history",
  time:      "Date",
  kind:      "memory",
  direction: Direction::Outgoing,
  sensitive: &[("Download Link", "download_link")],
  lengths:   true,
  plain:     &[("Media Type", "media_type"), ("Date", "date")],
}];

const LOGINS: &[Section] = &[Section {
  key:       "Login History",
  category:  "login",
  time:      "Created",
  kind:      "login",
  direction: Direction::Outgoing,
  sensitive: &[("IP", "ip_address")],
  lengths:   false,
  plain:     &[
    ("Country", "country"),
    ("Status", "status"),
    ("Device", "device"),
    ("Created", "created"),
  ],
}];

const STORY_VIEW_SECTIONS: &[&str] = &["Your Story Views", "Friend and Public Story Views"];

#[derive(Debug, Clone, Copy)]
enum Category {
  Account,
  Chats,
  Memories,
  SharedStory,
  Snaps,
  SupportNotes,
  StoryViews,
}

static ROUTES: LazyLock<RouteTable<Category>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"(^|/)account\.json$", Route::Handle(Category::Account)),
    (r"(^|/)chat_history\.json$", Route::Handle(Category::Chats)),
    (r"(^|/)memories_history\.json$", Route::Handle(Category::Memories)),
    (r"(^|/)shared_story\.json$", Route::Handle(Category::SharedStory)),
    (r"(^|/)snap_history\.json$", Route::Handle(Category::Snaps)),
    (r"(^|/)support_note\.json$", Route::Handle(Category::SupportNotes)),
    (r"(^|/)story_history\.json$", Route::Handle(Category::StoryViews)),
  ])
});

pub struct Snapchat;

impl Extractor for Snapchat {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |category, entry, _| {
      let payload = decode_json(&entry.bytes)?;
      match category {
        Category::Account => import_sections(ctx, &payload, LOGINS),
        Category::Chats => import_sections(ctx, &payload, CHATS),
        Category::Memories => import_sections(ctx, &payload, MEMORIES),
        Category::Snaps => import_sections(ctx, &payload, SNAPS),
        Category::SharedStory => import_shared_stories(ctx, &payload),
        Category::SupportNotes => import_support_notes(ctx, &payload),
        Category::StoryViews => import_story_views(ctx, &payload),
      }
    })
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Snapchat", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];

    let (event, direction) = match category {
      "chat-received" => ("Direct Message", Direction::Incoming),
      "chat-sent" => ("Direct Message", Direction::Outgoing),
      "snap-received" => ("Upload Post", Direction::Incoming),
      "snap-sent" => ("Upload Post", Direction::Outgoing),
      _ => return Some(described),
    };

    let described = EventDescription::new("Snapchat", event).direction(Some(direction));
    Some(match properties.get("media_type").and_then(Value::as_str) {
      Some(media) => described.media(media),
      None => described,
    })
  }
}

/// Seal and hash `text` as `field`, optionally recording its length.
fn protect(sanitizer: &Sanitizer, point: &mut Map<String, Value>, field: &str, text: &str, length: bool) -> Result<()> {
  sanitizer.seal_and_hash(point, field, text)?;
  if length {
    sanitizer.length(point, field, text);
  }
  Ok(())
}

fn engagement(kind: &str, direction: Direction) -> Engagement {
  let engagement = Engagement::new(SERVICE, kind);
  match direction {
    Direction::Incoming => engagement.incoming(1.0),
    Direction::Outgoing => engagement.outgoing(1.0),
  }
}

fn import_sections(ctx: &mut ImportContext<'_>, payload: &Value, sections: &[Section]) -> Result<()> {
  for section in sections {
    for item in fields::section(payload, section.key)? {
      let at = ctx.timestamp(fields::require(item, section.time)?, TIMESTAMP)?;
      if !ctx.include(at, item) {
        continue;
      }

      let mut point = Map::new();
      for (source, field) in section.sensitive {
        protect(ctx.sanitizer(), &mut point, field, fields::require_str(item, source)?, section.lengths)?;
      }
      for (source, field) in section.plain {
        if let Some(value) = item.get(*source) {
          point.insert((*field).to_owned(), value.clone());
        }
      }

      ctx.emit(generator_id(SERVICE, section.category), point, at)?;
      ctx.engage(engagement(section.kind, section.direction), at)?;
    }
  }
  Ok(())
}

fn import_shared_stories(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for story in fields::section(payload, "Shared Story")? {
    let created = fields::require(story, "Created")?;
    let at = ctx.timestamp(created, TIMESTAMP)?;
    if !ctx.include(at, story) {
      continue;
    }

    let sanitizer = ctx.sanitizer();
    let mut point = Map::new();
    protect(sanitizer, &mut point, "story_id", fields::require_str(story, "Story Id")?, true)?;
    point.insert("status".into(), story.get("Status").cloned().unwrap_or(Value::Null));
    point.insert("create_time".into(), created.clone());

    let content = fields::section(story, "Content")?
      .iter()
      .filter_map(Value::as_str)
      .map(|item| {
        let mut entry = Map::new();
        protect(sanitizer, &mut entry, "item", item, true)?;
        let extension = item.rsplit('.').next().unwrap_or(item);
        entry.insert("item_extension".into(), json!(extension));
        Ok(Value::Object(entry))
      })
      .collect::<Result<Vec<_>>>()?;
    point.insert("content".into(), Value::Array(content));

    ctx.emit(generator_id(SERVICE, "shared-story"), point, at)?;
    ctx.engage(engagement("share", Direction::Outgoing), at)?;
  }
  Ok(())
}

/// Every top-level key is a report type holding a list of notes.
fn import_support_notes(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  let Some(reports) = payload.as_object() else {
    return Ok(());
  };

  for (report_type, notes) in reports {
    for note in fields::as_array(notes, report_type)? {
      let created = fields::require(note, "Create Time")?;
      let at = ctx.timestamp(created, TIMESTAMP)?;
      if !ctx.include(at, note) {
        continue;
      }

      let sanitizer = ctx.sanitizer();
      let mut point = Map::new();
      protect(sanitizer, &mut point, "subject", fields::require_str(note, "Subject")?, true)?;
      protect(sanitizer, &mut point, "message", fields::require_str(note, "Message")?, true)?;
      point.insert("create_time".into(), created.clone());
      point.insert("note_type".into(), json!(report_type));

      ctx.emit(generator_id(SERVICE, "support-note"), point, at)?;
      ctx.engage(engagement("support", Direction::Outgoing), at)?;
    }
  }
  Ok(())
}

/// Story views keep every field but the viewer, which is only hashed. The
/// accompanying engagement carries no score.
fn import_story_views(ctx: &mut ImportContext<'_>, payload: &Value) -> Result<()> {
  for key in STORY_VIEW_SECTIONS {
    for view in fields::section(payload, key)? {
      let Some(viewer) = view.get("View") else {
        continue;
      };
      let at = ctx.timestamp(fields::require(view, "View Date")?, TIMESTAMP)?;
      if !ctx.include(at, view) {
        continue;
      }

      let mut point = view.as_object().cloned().unwrap_or_default();
      point.remove("View");
      ctx.sanitizer().hash(&mut point, "viewer", &fields::text(viewer));

      ctx.emit(generator_id(SERVICE, "story-view"), point, at)?;
      ctx.engage(Engagement::new(SERVICE, "story-view"), at)?;
    }
  }
  Ok(())
}
