//! ChatGPT export (`conversations.json`).

use std::{path::Path, sync::LazyLock};

use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};

use super::{Direction, EventDescription, Extractor, owned_by};
use crate::{
  Result,
  archive::{Route, RouteTable, decode_json, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "chatgpt";

const TIMESTAMP: &[TimestampFormat] = &[TimestampFormat::UnixSeconds, TimestampFormat::Iso8601];

static ROUTES: LazyLock<RouteTable<()>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"^conversations\.json$", Route::Handle(())),
    // Rendered transcripts, feedback, account details and uploaded files.
    (r".", Route::Skip),
  ])
});

pub struct ChatGpt;

impl Extractor for ChatGpt {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |(), entry, _| {
      let conversations = decode_json(&entry.bytes)?;
      for conversation in fields::as_array(&conversations, &entry.name)? {
        import_conversation(ctx, conversation)?;
      }
      Ok(())
    })
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Chat GPT", generator_id)?;
    if generator_id != sift_core::record::generator_id(SERVICE, "message") {
      return Some(described);
    }

    let direction = match properties.get("author").and_then(Value::as_str) {
      Some("user") => Some(Direction::Outgoing),
      Some("system" | "assistant") => Some(Direction::Incoming),
      _ => None,
    };
    Some(EventDescription::new("Chat GPT", "Message").direction(direction).media("Text"))
  }
}

/// One record per text message in the conversation's `mapping` tree.
fn import_conversation(ctx: &mut ImportContext<'_>, conversation: &Value) -> Result<()> {
  let Some(mapping) = conversation.get("mapping").and_then(Value::as_object) else {
    return Ok(());
  };

  let mut metadata = conversation.as_object().cloned().unwrap_or_default();
  metadata.remove("mapping");
  let metadata = Value::Object(metadata);
  let title = conversation.get("title").and_then(Value::as_str);

  for (message_id, node) in mapping {
    let Some(message) = node.get("message").filter(|m| !m.is_null()) else {
      continue;
    };
    let content = message.get("content");
    if content.and_then(|c| c.get("content_type")).and_then(Value::as_str) != Some("text") {
      continue;
    }

    // A null creation time marks a hidden message; an absent one is the epoch.
    let at = match message.get("create_time") {
      Some(Value::Null) => continue,
      Some(time) => ctx.timestamp(time, TIMESTAMP)?,
      None => ctx.timestamp(&json!(0), TIMESTAMP)?,
    };
    if !ctx.include(at, message) {
      continue;
    }

    let text = content
      .map(|c| fields::section(c, "parts"))
      .transpose()?
      .unwrap_or_default()
      .iter()
      .map(fields::text)
      .collect::<Vec<_>>()
      .join("\n");
    let author = message
      .pointer("/author/role")
      .and_then(Value::as_str)
      .unwrap_or("unknown")
      .to_owned();

    let sanitizer = ctx.sanitizer();
    let mut point = Map::new();
    point.insert("message_id".into(), json!(message_id));
    point.insert("author".into(), json!(author));
    if let Some(title) = title {
      sanitizer.seal(&mut point, "conversation_title", title)?;
    }
    point.insert("conversation_metadata".into(), metadata.clone());
    sanitizer.seal_annotated(&mut point, "content", &text)?;

    ctx.emit(generator_id(SERVICE, "message"), point, at)?;
    let engagement = Engagement::new(SERVICE, "message");
    match author.as_str() {
      "user" => ctx.engage(engagement.outgoing(1.0), at)?,
      "system" | "assistant" => ctx.engage(engagement.incoming(1.0), at)?,
      _ => {}
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use sift_core::record::SecondaryTag;

  use super::*;
  use crate::testing::import_zip;

  fn conversations() -> Value {
    json!([{
      "title": "Trip planning",
      "create_time": 1700000000.0,
      "mapping": {
        "root": {"id": "root", "message": null, "children": ["a"]},
        "a": {"id": "a", "message": {
          "author": {"role": "user"},
          "create_time": 1700000001.25,
          "content": {"content_type": "text", "parts": ["Where should I go", "in spring?"]},
        }},
        "b": {"id": "b", "message": {
          "author": {"role": "assistant"},
          "create_time": 1700000002,
          "content": {"content_type": "text", "parts": ["Kyoto."]},
        }},
        "c": {"id": "c", "message": {
          "author": {"role": "tool"},
          "create_time": 1700000003,
          "content": {"content_type": "code", "text": "print(1)"},
        }},
        "d": {"id": "d", "message": {
          "author": {"role": "system"},
          "create_time": null,
          "content": {"content_type": "text", "parts": [""]},
        }},
      },
    }])
  }

  #[test]
  fn text_messages_become_records() {
    let bytes = conversations().to_string().into_bytes();
    let out = import_zip(&ChatGpt, &[
      ("conversations.json", &bytes),
      ("chat.html", b"<html></html>"),
    ])
    .unwrap();

    let messages = out.generator("pdk-external-chatgpt-message");
    assert_eq!(messages.len(), 2);

    let user = messages.iter().find(|m| m.properties["author"] == "user").unwrap();
    assert_eq!(out.open(&user.properties["pdk_encrypted_content"]), "Where should I go\nin spring?");
    assert_eq!(out.open(&user.properties["pdk_encrypted_conversation_title"]), "Trip planning");
    assert!(user.properties["conversation_metadata"].get("mapping").is_none());
    assert_eq!(user.properties["conversation_metadata"]["title"], "Trip planning");
    assert_eq!(user.occurred_at, Utc.timestamp_opt(1700000001, 250_000_000).unwrap());
  }

  #[test]
  fn engagement_follows_the_author() {
    let bytes = conversations().to_string().into_bytes();
    let out = import_zip(&ChatGpt, &[("conversations.json", &bytes)]).unwrap();

    let mut tags: Vec<_> = out
      .generator("pdk-external-engagement-chatgpt")
      .iter()
      .map(|r| r.secondary_tag.unwrap())
      .collect();
    tags.sort_by_key(|t| t.as_str());
    assert_eq!(tags, vec![SecondaryTag::Active, SecondaryTag::IncomingActive]);

    let assistant = out
      .generator("pdk-external-chatgpt-message")
      .into_iter()
      .find(|m| m.properties["author"] == "assistant")
      .unwrap();
    let described = ChatGpt
      .describe_event("pdk-external-chatgpt-message", &assistant.properties)
      .unwrap();
    assert_eq!(described.direction, Some(Direction::Incoming));
  }
}
