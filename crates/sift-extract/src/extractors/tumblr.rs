//! Tumblr privacy export (`payload*.json`).

use std::{path::Path, sync::LazyLock};

use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule};
use tracing::warn;

use super::{EventDescription, Extractor, owned_by};
use crate::{
  Result,
  archive::{Route, RouteTable, decode_json, walk},
  context::ImportContext,
  fields,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "tumblr";

const TIMESTAMP: &[TimestampFormat] = &[TimestampFormat::UnixSeconds, TimestampFormat::Iso8601];

/// Which parts of an item become the record.
#[derive(Debug, Clone, Copy)]
enum Keep {
  /// The whole item.
  All,
  /// Only these keys, when present.
  Only(&'static [&'static str]),
  /// The item is itself a timestamp, stored as `timestamp`.
  Instant,
}

struct Section {
  key:        &'static str,
  category:   &'static str,
  /// Key holding the time; ignored for [`Keep::Instant`].
  time:       &'static str,
  keep:       Keep,
  rules:      &'static [FieldRule],
  engagement: Option<(&'static str, f64)>,
  /// Items with unreadable dates are logged and skipped instead of failing
  /// the archive.
  isolated:   bool,
}

const AD_VIEW: &[&str] = &["serve_time", "viewed", "interacted"];

const SECTIONS: &[Section] = &[
  Section {
    key:        "dashboard",
    category:   "dashboard-item",
    time:       "serve_time",
    keep:       Keep::All,
    rules:      &[],
    engagement: None,
    isolated:   false,
  },
  Section {
    key:        "unfollows",
    category:   "unfollow",
    time:       "timestamp",
    keep:       Keep::Only(&["blog_name", "timestamp"]),
    rules:      &[FieldRule::new(&["blog_name"], Action::SealAndHashAnnotated)],
    engagement: Some(("follow", 1.0)),
    isolated:   false,
  },
  Section {
    key:        "ads_analytics",
    category:   "ads-served",
    time:       "serve_time",
    keep:       Keep::Only(&["post_url", "placement_id", "serve_time", "viewed", "interacted"]),
    rules:      &[
      FieldRule::new(&["post_url"], Action::SealAndHash),
      FieldRule::new(&["placement_id"], Action::SealAndHash),
    ],
    engagement: Some(("advertising", 0.0)),
    isolated:   true,
  },
  Section {
    key:        "active_times",
    category:   "active-time",
    time:       "",
    keep:       Keep::Instant,
    rules:      &[],
    engagement: Some(("active-time", 1.0)),
    isolated:   false,
  },
  Section {
    key:        "api_applications_used",
    category:   "api-session",
    time:       "session_created_time",
    keep:       Keep::All,
    rules:      &[],
    engagement: Some(("api-session", 0.0)),
    isolated:   false,
  },
  Section {
    key:        "push_notification_opens",
    category:   "push-notification-open",
    time:       "timestamp",
    keep:       Keep::Only(&[
      "from_blog",
      "to_blog",
      "timestamp",
      "notification_type",
      "device",
      "follow_up_action",
      "app_version",
    ]),
    rules:      &[
      FieldRule::new(&["from_blog"], Action::SealAndHash),
      FieldRule::new(&["to_blog"], Action::SealAndHash),
    ],
    engagement: Some(("notification-open", 0.0)),
    isolated:   false,
  },
  Section {
    key:        "push_notification_settings",
    category:   "push-notification-setting",
    time:       "timestamp",
    keep:       Keep::All,
    rules:      &[],
    engagement: Some(("notification-setting", 1.0)),
    isolated:   false,
  },
  Section {
    key:        "gemini_analytics",
    category:   "ads-served",
    time:       "serve_time",
    keep:       Keep::Only(&["placement_id", "serve_time", "viewed", "interacted"]),
    rules:      &[FieldRule::new(&["placement_id"], Action::SealAndHash)],
    engagement: Some(("advertising", 0.0)),
    isolated:   true,
  },
  Section {
    key:        "client_side_ad_analytics",
    category:   "ads-served",
    time:       "serve_time",
    keep:       Keep::Only(&["placement_id", "ad_type", "serve_time", "viewed", "interacted"]),
    rules:      &[FieldRule::new(&["placement_id"], Action::SealAndHash)],
    engagement: Some(("advertising", 0.0)),
    isolated:   true,
  },
  Section {
    key:        "explore_takeover_analytics",
    category:   "ads-served",
    time:       "serve_time",
    keep:       Keep::Only(&["post_url", "tracked_unit", "serve_time", "viewed", "interacted"]),
    rules:      &[FieldRule::new(&["post_url"], Action::SealAndHash)],
    engagement: Some(("advertising", 0.0)),
    isolated:   true,
  },
];

static ROUTES: LazyLock<RouteTable<()>> =
  LazyLock::new(|| RouteTable::new(&[(r"^payload.*\.json$", Route::Handle(()))]));

pub struct Tumblr;

impl Extractor for Tumblr {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |(), entry, _| {
      let payloads = decode_json(&entry.bytes)?;
      for payload in fields::as_array(&payloads, &entry.name)? {
        let data = fields::require(payload, "data")?;
        for section in SECTIONS {
          import_section(ctx, section, data)?;
        }
      }
      Ok(())
    })
  }

  fn describe_event(&self, generator_id: &str, _properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Tumblr", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];

    Some(match category {
      "unfollow" => EventDescription::new("Tumblr", "Unfollow").outgoing().media("Relationship"),
      "ads-served" => EventDescription::new("Tumblr", "Viewed Ad").incoming().media("Advertisement"),
      _ => described,
    })
  }
}

fn import_section(ctx: &mut ImportContext<'_>, section: &Section, data: &Value) -> Result<()> {
  for item in fields::section(data, section.key)? {
    let time = match section.keep {
      Keep::Instant => item,
      _ => fields::require(item, section.time)?,
    };
    let at = match ctx.timestamp(time, TIMESTAMP) {
      Ok(at) => at,
      Err(e) if section.isolated => {
        warn!(service = SERVICE, section = section.key, error = %e, "skipping item with unreadable date");
        continue;
      }
      Err(e) => return Err(e),
    };
    if !ctx.include(at, item) {
      continue;
    }

    let mut point = match section.keep {
      Keep::All => item.clone(),
      Keep::Instant => json!({ "timestamp": item }),
      Keep::Only(keys) => Value::Object(
        keys
          .iter()
          .filter_map(|k| item.get(*k).map(|v| ((*k).to_owned(), v.clone())))
          .collect(),
      ),
    };
    ctx.sanitizer().apply(&mut point, section.rules)?;

    ctx.emit_value(generator_id(SERVICE, section.category), point, at)?;
    if let Some((kind, score)) = section.engagement {
      ctx.engage(Engagement::new(SERVICE, kind).outgoing(score), at)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use sift_core::record::SecondaryTag;

  use super::*;
  use crate::testing::import_zip;

  fn payload(data: Value) -> Vec<u8> { json!([{ "data": data }]).to_string().into_bytes() }

  #[test]
  fn sections_are_optional() {
    let bytes = payload(json!({
      "unfollows": [{"blog_name": "staff", "timestamp": 1577836800}],
      "active_times": [1577836900, "2020-01-01T00:05:00Z"],
    }));
    let out = import_zip(&Tumblr, &[("payload-0.json", &bytes)]).unwrap();

    let unfollow = &out.generator("pdk-external-tumblr-unfollow")[0].properties;
    assert_eq!(out.open(&unfollow["pdk_encrypted_blog_name"]), "staff");
    assert!(unfollow["pdk_hashed_blog_name"].is_string());
    assert_eq!(unfollow["pdk_word_count_blog_name"], 1);
    assert_eq!(unfollow["timestamp"], 1577836800);

    assert_eq!(out.generator("pdk-external-tumblr-active-time").len(), 2);
    assert!(out.generator("pdk-external-tumblr-dashboard-item").is_empty());
  }

  #[test]
  fn ad_items_with_bad_dates_are_skipped_individually() {
    let bytes = payload(json!({
      "ads_analytics": [
        {"post_url": "https://x.tumblr.com/1", "placement_id": "p1", "serve_time": "garbage", "viewed": true, "interacted": false},
        {"post_url": "https://x.tumblr.com/2", "placement_id": "p2", "serve_time": 1577836800, "viewed": true, "interacted": false},
      ],
      "gemini_analytics": [
        {"placement_id": "g1", "serve_time": "2020-01-01T00:00:00Z", "viewed": false, "interacted": false, "secret": "x"},
      ],
    }));
    let out = import_zip(&Tumblr, &[("payload-0.json", &bytes)]).unwrap();

    let ads = out.generator("pdk-external-tumblr-ads-served");
    assert_eq!(ads.len(), 2);
    assert_eq!(out.open(&ads[0].properties["pdk_encrypted_placement_id"]), "p2");
    assert!(ads[1].properties.get("secret").is_none());

    let tags: Vec<_> = out
      .generator("pdk-external-engagement-tumblr")
      .iter()
      .map(|r| r.secondary_tag)
      .collect();
    assert_eq!(tags, vec![Some(SecondaryTag::Passive); 2]);
  }

  #[test]
  fn bad_dates_elsewhere_fail_the_archive() {
    let bytes = payload(json!({"dashboard": [{"serve_time": "whenever", "post_id": 1}]}));
    assert!(import_zip(&Tumblr, &[("payload-0.json", &bytes)]).is_err());
  }

  #[test]
  fn push_notifications_hash_both_blogs() {
    let bytes = payload(json!({"push_notification_opens": [{
      "from_blog": "a", "to_blog": "b", "timestamp": 1577836800,
      "notification_type": "like", "device": "ios", "follow_up_action": "open", "app_version": "1.0",
    }]}));
    let out = import_zip(&Tumblr, &[("payload-0.json", &bytes)]).unwrap();

    let open = &out.generator("pdk-external-tumblr-push-notification-open")[0].properties;
    assert!(open.get("from_blog").is_none());
    assert!(open["pdk_hashed_to_blog"].is_string());
    assert_eq!(open["device"], "ios");
  }
}
