//! Twitter archive (`window.YTD.*` scripts).

use std::{path::Path, sync::LazyLock};

use chrono::Utc;
use serde_json::{Map, Value};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule};

use super::{EventDescription, Extractor, owned_by};
use crate::{
  Result,
  archive::{Route, RouteTable, decode_ytd, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "twitter";

const TWEET_TIME: &[TimestampFormat] = &[
  TimestampFormat::Offset("%a %b %d %H:%M:%S %z %Y"),
  TimestampFormat::Iso8601,
];

const MESSAGE_TIME: &[TimestampFormat] = &[TimestampFormat::Iso8601, TimestampFormat::UnixMillis];

const TWEET_RULES: &[FieldRule] = &[
  FieldRule::new(&["id"], Action::SealAndHash),
  FieldRule::new(&["id_str"], Action::SealAndHash),
  FieldRule::new(&["full_text"], Action::SealAnnotated),
  FieldRule::new(&["entities"], Action::SealJson),
  FieldRule::new(&["urls"], Action::SealJson),
];

#[derive(Debug, Clone, Copy)]
enum Category {
  DirectMessages,
  Likes,
  Tweets,
}

static ROUTES: LazyLock<RouteTable<Category>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"^direct-message\.js", Route::Handle(Category::DirectMessages)),
    (r"^like\.js", Route::Handle(Category::Likes)),
    (r"^tweet\.js", Route::Handle(Category::Tweets)),
  ])
});

pub struct Twitter;

impl Extractor for Twitter {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |category, entry, _| {
      let payload = decode_ytd(&entry.bytes)?;
      let items = fields::as_array(&payload, &entry.name)?;
      match category {
        Category::DirectMessages => import_direct_messages(ctx, items),
        Category::Likes => import_likes(ctx, items),
        Category::Tweets => import_tweets(ctx, items),
      }
    })
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Twitter", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];

    Some(match category {
      "like" => EventDescription::new("Twitter", "Positive Reaction").outgoing().media("Reaction"),
      "tweet" => {
        let media = if properties.contains_key("pdk_encrypted_urls") {
          "Link"
        } else if properties.contains_key("pdk_encrypted_entities") {
          "Image / Video"
        } else {
          "Text"
        };
        EventDescription::new("Twitter", "Post Upload").outgoing().media(media)
      }
      "direct-message" => EventDescription::new("Twitter", "Direct Message").outgoing().media("Text"),
      _ => described,
    })
  }
}

/// Likes carry no timestamp of their own; they are stamped with the time of
/// import.
fn import_likes(ctx: &mut ImportContext<'_>, likes: &[Value]) -> Result<()> {
  let at = Utc::now();

  for like in likes {
    let like = fields::require(like, "like")?;
    if !ctx.include(at, like) {
      continue;
    }

    let sanitizer = ctx.sanitizer();
    let mut point = Map::new();
    sanitizer.seal_and_hash(&mut point, "tweetId", &fields::text(fields::require(like, "tweetId")?))?;
    if let Some(text) = like.get("fullText").and_then(Value::as_str) {
      sanitizer.seal_annotated(&mut point, "fullText", text)?;
    }

    ctx.emit(generator_id(SERVICE, "like"), point, at)?;
    ctx.engage(Engagement::new(SERVICE, "reaction").outgoing(0.5), at)?;
  }
  Ok(())
}

fn import_tweets(ctx: &mut ImportContext<'_>, tweets: &[Value]) -> Result<()> {
  for tweet in tweets {
    // Newer archives wrap each tweet as `{"tweet": {...}}`.
    let tweet = tweet.get("tweet").unwrap_or(tweet);
    let at = ctx.timestamp(fields::require(tweet, "created_at")?, TWEET_TIME)?;
    if !ctx.include(at, tweet) {
      continue;
    }

    let mut tweet = tweet.clone();
    ctx.sanitizer().apply(&mut tweet, TWEET_RULES)?;
    ctx.emit_value(generator_id(SERVICE, "tweet"), tweet, at)?;
    ctx.engage(Engagement::new(SERVICE, "post").outgoing(1.0), at)?;
  }
  Ok(())
}

fn import_direct_messages(ctx: &mut ImportContext<'_>, conversations: &[Value]) -> Result<()> {
  for conversation in conversations {
    let conversation = fields::require(conversation, "dmConversation")?;
    let conversation_id = fields::require(conversation, "conversationId")?;

    for message in fields::section(conversation, "messages")? {
      // Join and leave events have other keys; only created messages count.
      let Some(created) = message.get("messageCreate") else {
        continue;
      };
      let raw_at = fields::require(created, "createdAt")?;
      let at = ctx.timestamp(raw_at, MESSAGE_TIME)?;
      if !ctx.include(at, created) {
        continue;
      }

      let sanitizer = ctx.sanitizer();
      let mut point = Map::new();
      sanitizer.seal_and_hash(&mut point, "recipientId", &fields::text(fields::require(created, "recipientId")?))?;
      sanitizer.seal_and_hash(&mut point, "senderId", &fields::text(fields::require(created, "senderId")?))?;
      sanitizer.seal_annotated(&mut point, "text", fields::require_str(created, "text")?)?;
      point.insert("id".into(), fields::require(created, "id")?.clone());
      point.insert("conversationId".into(), conversation_id.clone());
      point.insert("createdAt".into(), raw_at.clone());

      let media = fields::section(created, "mediaUrls")?;
      if !media.is_empty() {
        sanitizer.seal_json(&mut point, "mediaUrls", &Value::Array(media.to_vec()))?;
      }

      ctx.emit(generator_id(SERVICE, "direct-message"), point, at)?;
      ctx.engage(Engagement::new(SERVICE, "message").outgoing(1.0), at)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::testing::import_zip;

  const TWEETS: &str = r#"window.YTD.tweet.part0 = [
    {"tweet": {"id": "111", "id_str": "111", "full_text": "Hello from the archive",
               "created_at": "Wed Oct 10 20:19:24 +0000 2018", "retweet_count": "0",
               "entities": {"hashtags": []}}},
    {"id": "222", "full_text": "flat shape", "created_at": "Thu Oct 11 08:00:00 +0200 2018"}
  ]"#;

  #[test]
  fn tweets_in_both_shapes() {
    let out = import_zip(&Twitter, &[("tweet.js", TWEETS.as_bytes())]).unwrap();
    let tweets = out.generator("pdk-external-twitter-tweet");
    assert_eq!(tweets.len(), 2);

    let first = &tweets[0].properties;
    assert!(first.get("full_text").is_none());
    assert!(first.get("id").is_none());
    assert_eq!(out.open(&first["pdk_encrypted_full_text"]), "Hello from the archive");
    assert_eq!(first["pdk_word_count_full_text"], 4);
    assert!(first["pdk_hashed_id_str"].is_string());
    assert_eq!(first["retweet_count"], "0");
    assert_eq!(tweets[0].occurred_at, Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap());
    assert_eq!(tweets[1].occurred_at, Utc.with_ymd_and_hms(2018, 10, 11, 6, 0, 0).unwrap());

    let described = Twitter
      .describe_event("pdk-external-twitter-tweet", first)
      .unwrap();
    assert_eq!(described.media_type.as_deref(), Some("Image / Video"));
    assert_eq!(
      Twitter
        .describe_event("pdk-external-twitter-tweet", &tweets[1].properties)
        .unwrap()
        .media_type
        .as_deref(),
      Some("Text")
    );
  }

  #[test]
  fn likes_are_stamped_at_import_time() {
    let likes = r#"window.YTD.like.part0 = [{"like": {"tweetId": "42", "fullText": "nice one"}}]"#;
    let before = Utc::now();
    let out = import_zip(&Twitter, &[("like.js", likes.as_bytes())]).unwrap();

    let like = out.generator("pdk-external-twitter-like")[0];
    assert!(like.occurred_at >= before);
    assert_eq!(out.open(&like.properties["pdk_encrypted_tweetId"]), "42");
    assert!(like.properties["pdk_hashed_tweetId"].is_string());
    assert_eq!(out.generator("pdk-external-engagement-twitter").len(), 1);
  }

  #[test]
  fn direct_messages_keep_ids_and_seal_media() {
    let messages = r#"window.YTD.direct_message.part0 = [{"dmConversation": {
      "conversationId": "1-2",
      "messages": [
        {"messageCreate": {"id": "9", "senderId": "1", "recipientId": "2", "text": "see you",
                           "createdAt": "2020-03-01T12:00:00.000Z", "mediaUrls": ["https://t.co/x"]}},
        {"joinConversation": {"initiatingUserId": "1"}}
      ]}}]"#;
    let out = import_zip(&Twitter, &[("direct-message.js", messages.as_bytes())]).unwrap();

    let records = out.generator("pdk-external-twitter-direct-message");
    assert_eq!(records.len(), 1);
    let props = &records[0].properties;
    assert_eq!(props["conversationId"], "1-2");
    assert_eq!(props["id"], "9");
    assert!(out.open(&props["pdk_encrypted_mediaUrls"]).contains("https://t.co/x"));
    assert_eq!(records[0].occurred_at, Utc.with_ymd_and_hms(2020, 3, 1, 12, 0, 0).unwrap());
  }

  #[test]
  fn unparseable_tweet_dates_abort_the_archive() {
    let bad = r#"window.YTD.tweet.part0 = [{"id": "1", "created_at": "yesterday"}]"#;
    assert!(import_zip(&Twitter, &[("tweet.js", bad.as_bytes())]).is_err());
  }
}
