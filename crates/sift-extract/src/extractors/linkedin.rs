//! LinkedIn data export (one CSV per category).
//!
//! Each CSV is described by a [`Table`]: which column holds the time, which
//! columns become which fields and what the sanitizer does to them. A few
//! files need extra per-row fields, supplied through [`Table::extra`].

use std::{path::Path, sync::LazyLock};

use csv::StringRecord;
use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};
use sift_sanitize::{Action, FieldRule, Sanitizer};
use tracing::{debug, warn};

use super::{Direction, EventDescription, Extractor, owned_by};
use crate::{
  Error, Result,
  archive::{Route, RouteTable, csv_rows, walk},
  context::ImportContext,
  timestamp::TimestampFormat,
};

const SERVICE: &str = "linkedin";

const LOCAL_MINUTES: &[TimestampFormat] = &[TimestampFormat::Local("%m/%d/%y, %I:%M %p")];

/// Time cells holding this marker have no date and the row is ignored.
const NOT_AVAILABLE: &str = "Not Available";

/// What to do when a row's time cell cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BadTime {
  /// Fail the whole archive.
  Abort,
  /// Stop reading this file, keeping what was already imported.
  StopFile,
}

type Extra = fn(&Sanitizer, &StringRecord, &mut Map<String, Value>) -> Result<()>;

struct Table {
  category:    &'static str,
  /// `(column, text)` that marks the header row.
  header:      (usize, &'static str),
  /// Shorter rows are preamble and are ignored.
  min_columns: usize,
  time:        usize,
  formats:     &'static [TimestampFormat],
  bad_time:    BadTime,
  /// `(column, field)` pairs copied into the record before `rules` run.
  columns:     &'static [(usize, &'static str)],
  rules:       &'static [FieldRule],
  extra:       Option<Extra>,
  engagement:  Option<&'static str>,
}

const fn seal_and_hash(field: &'static [&'static str]) -> FieldRule { FieldRule::new(field, Action::SealAndHash) }

const FOLLOWS: Table = Table {
  category:    "follow",
  header:      (0, "Organization"),
  min_columns: 0,
  time:        1,
  formats:     &[TimestampFormat::ZoneName("%a %b %d %H:%M:%S %Z %Y")],
  bad_time:    BadTime::Abort,
  columns:     &[(0, "organization")],
  rules:       &[seal_and_hash(&["organization"])],
  extra:       None,
  engagement:  Some("follow"),
};

const CONNECTIONS: Table = Table {
  category:    "connection",
  header:      (0, "First Name"),
  min_columns: 6,
  time:        5,
  formats:     &[TimestampFormat::LocalNoon("%d %b %Y")],
  bad_time:    BadTime::Abort,
  columns:     &[(0, "first_name"), (1, "last_name"), (2, "email"), (3, "company"), (4, "position")],
  rules:       &[
    seal_and_hash(&["first_name"]),
    seal_and_hash(&["last_name"]),
    seal_and_hash(&["email"]),
    seal_and_hash(&["company"]),
    seal_and_hash(&["position"]),
  ],
  extra:       None,
  engagement:  None,
};

const CONTACTS: Table = Table {
  category:    "contact",
  header:      (0, "Source"),
  min_columns: 0,
  time:        7,
  formats:     LOCAL_MINUTES,
  bad_time:    BadTime::Abort,
  columns:     &[
    (0, "source"),
    (1, "first_name"),
    (2, "last_name"),
    (3, "companies"),
    (4, "title"),
    (5, "emails"),
    (6, "phone_numbers"),
  ],
  rules:       &[
    seal_and_hash(&["first_name"]),
    seal_and_hash(&["last_name"]),
    FieldRule::new(&["companies"], Action::Seal),
    seal_and_hash(&["title"]),
    FieldRule::new(&["emails"], Action::Seal),
    FieldRule::new(&["phone_numbers"], Action::Seal),
  ],
  extra:       Some(seal_row),
  engagement:  None,
};

const EMAILS: Table = Table {
  category:    "email",
  header:      (0, "Email Address"),
  min_columns: 0,
  time:        3,
  formats:     LOCAL_MINUTES,
  bad_time:    BadTime::Abort,
  columns:     &[(0, "email")],
  rules:       &[seal_and_hash(&["email"])],
  extra:       Some(email_flags),
  engagement:  None,
};

const GROUPS: Table = Table {
  category:    "membership",
  header:      (0, "Group name"),
  min_columns: 0,
  time:        3,
  formats:     &[TimestampFormat::ZoneName("%Y/%m/%d %H:%M:%S %Z")],
  bad_time:    BadTime::Abort,
  columns:     &[(0, "group_name"), (1, "group_description"), (2, "group_rules"), (4, "pdk_membership")],
  rules:       &[
    seal_and_hash(&["group_name"]),
    FieldRule::new(&["group_description"], Action::Seal),
    FieldRule::new(&["group_rules"], Action::Seal),
  ],
  extra:       None,
  engagement:  None,
};

const INVITATIONS: Table = Table {
  category:    "invitation",
  header:      (0, "From"),
  min_columns: 0,
  time:        2,
  formats:     LOCAL_MINUTES,
  bad_time:    BadTime::Abort,
  columns:     &[(0, "from"), (1, "to"), (3, "message"), (4, "pdk_direction")],
  rules:       &[
    seal_and_hash(&["from"]),
    seal_and_hash(&["to"]),
    FieldRule::new(&["message"], Action::SealWithLength),
  ],
  extra:       None,
  engagement:  None,
};

const MESSAGES: Table = Table {
  category:    "message",
  header:      (2, "FROM"),
  min_columns: 0,
  time:        5,
  formats:     &[
    TimestampFormat::Iso8601,
    TimestampFormat::ZoneName("%Y-%m-%d %H:%M:%S %Z"),
  ],
  bad_time:    BadTime::StopFile,
  columns:     &[(2, "from"), (4, "to"), (6, "subject"), (7, "content"), (8, "pdk_folder")],
  rules:       &[
    seal_and_hash(&["from"]),
    seal_and_hash(&["to"]),
    FieldRule::new(&["subject"], Action::SealWithLength),
    FieldRule::new(&["content"], Action::SealWithLength),
  ],
  extra:       None,
  engagement:  Some("message"),
};

const RECOMMENDATION_COLUMNS: &[(usize, &str)] =
  &[(0, "first_name"), (1, "last_name"), (2, "company"), (3, "title"), (4, "text")];

const RECOMMENDATION_RULES: &[FieldRule] = &[
  seal_and_hash(&["first_name"]),
  seal_and_hash(&["last_name"]),
  seal_and_hash(&["company"]),
  seal_and_hash(&["title"]),
  FieldRule::new(&["text"], Action::SealWithLength),
];

const RECOMMENDATIONS_GIVEN: Table = Table {
  category:    "recommendation-given",
  header:      (0, "First Name"),
  min_columns: 0,
  time:        5,
  formats:     LOCAL_MINUTES,
  bad_time:    BadTime::Abort,
  columns:     RECOMMENDATION_COLUMNS,
  rules:       RECOMMENDATION_RULES,
  extra:       Some(recommendation_status),
  engagement:  Some("recommendation"),
};

const RECOMMENDATIONS_RECEIVED: Table = Table {
  category: "recommendation-received",
  engagement: None,
  ..RECOMMENDATIONS_GIVEN
};

const REGISTRATION: Table = Table {
  category:    "registration",
  header:      (0, "Registered At"),
  min_columns: 0,
  time:        0,
  formats:     LOCAL_MINUTES,
  bad_time:    BadTime::Abort,
  columns:     &[],
  rules:       &[],
  extra:       Some(registration_details),
  engagement:  Some("registration"),
};

static ROUTES: LazyLock<RouteTable<&'static Table>> = LazyLock::new(|| {
  RouteTable::new(&[
    (r"^Company Follows\.csv", Route::Handle(&FOLLOWS)),
    (r"^Connections\.csv", Route::Handle(&CONNECTIONS)),
    (r"^Contacts\.csv", Route::Handle(&CONTACTS)),
    (r"^Email Addresses\.csv", Route::Handle(&EMAILS)),
    (r"^Groups\.csv", Route::Handle(&GROUPS)),
    (r"^Invitations\.csv", Route::Handle(&INVITATIONS)),
    (r"^messages\.csv", Route::Handle(&MESSAGES)),
    (r"^Recommendations Given\.csv", Route::Handle(&RECOMMENDATIONS_GIVEN)),
    (r"^Recommendations Received\.csv", Route::Handle(&RECOMMENDATIONS_RECEIVED)),
    (r"^Registration\.csv", Route::Handle(&REGISTRATION)),
  ])
});

pub struct LinkedIn;

impl Extractor for LinkedIn {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    walk(SERVICE, path, &ROUTES, |table, entry, _| import_table(ctx, table, &entry.name, &entry.bytes))
  }

  fn describe_event(&self, generator_id: &str, properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "LinkedIn", generator_id)?;
    let category = &generator_id[sift_core::record::generator_id(SERVICE, "").len()..];
    let recorded_direction = || {
      properties
        .get("pdk_direction")
        .and_then(Value::as_str)
        .and_then(|d| match d.to_ascii_lowercase().as_str() {
          "incoming" => Some(Direction::Incoming),
          "outgoing" => Some(Direction::Outgoing),
          _ => None,
        })
    };

    Some(match category {
      "follow" => EventDescription::new("LinkedIn", "Follow").outgoing().media("Relationship"),
      "connection" => EventDescription::new("LinkedIn", "Connection").outgoing().media("Relationship"),
      "membership" => EventDescription::new("LinkedIn", "Joined Group").outgoing().media("Relationship"),
      "invitation" => EventDescription::new("LinkedIn", "Invitation")
        .direction(recorded_direction())
        .media("Relationship"),
      "message" => EventDescription::new("LinkedIn", "Direct Message")
        .direction(recorded_direction())
        .media("Text"),
      "recommendation-given" => EventDescription::new("LinkedIn", "Recommendation").outgoing().media("Relationship"),
      "recommendation-received" => {
        EventDescription::new("LinkedIn", "Recommendation").incoming().media("Relationship")
      }
      _ => described,
    })
  }
}

fn cell(row: &StringRecord, index: usize) -> Result<&str> {
  row.get(index).ok_or_else(|| Error::MissingField(format!("column {index}")))
}

fn import_table(ctx: &mut ImportContext<'_>, table: &Table, entry: &str, bytes: &[u8]) -> Result<()> {
  for row in csv_rows(bytes).records() {
    let row = row?;
    if row.len() < table.min_columns || row.get(table.header.0) == Some(table.header.1) {
      continue;
    }

    let time = cell(&row, table.time)?;
    if time == NOT_AVAILABLE {
      debug!(service = SERVICE, entry, "row without a date");
      continue;
    }
    let at = match ctx.timestamp_str(time, table.formats) {
      Ok(at) => at,
      Err(e) if table.bad_time == BadTime::StopFile => {
        warn!(service = SERVICE, entry, error = %e, "unreadable date; ignoring the rest of the file");
        return Ok(());
      }
      Err(e) => return Err(e),
    };

    let raw = Value::Array(row.iter().map(|c| json!(c)).collect());
    if !ctx.include(at, &raw) {
      continue;
    }

    let sanitizer = ctx.sanitizer();
    let mut point = Map::new();
    for (index, field) in table.columns {
      point.insert((*field).to_owned(), json!(cell(&row, *index)?));
    }
    if let Some(extra) = table.extra {
      extra(sanitizer, &row, &mut point)?;
    }
    let mut point = Value::Object(point);
    sanitizer.apply(&mut point, table.rules)?;

    ctx.emit_value(generator_id(SERVICE, table.category), point, at)?;
    if let Some(kind) = table.engagement {
      ctx.engage(Engagement::new(SERVICE, kind).outgoing(1.0), at)?;
    }
  }
  Ok(())
}

// ── Per-table extras ─────────────────────────────────────────────────────

/// Seal the whole row, re-encoded as one CSV line.
fn seal_row(sanitizer: &Sanitizer, row: &StringRecord, point: &mut Map<String, Value>) -> Result<()> {
  let mut writer = csv::Writer::from_writer(Vec::new());
  writer.write_record(row)?;
  let line = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
  sanitizer.seal(point, "row", &String::from_utf8_lossy(&line))?;
  Ok(())
}

fn email_flags(_: &Sanitizer, row: &StringRecord, point: &mut Map<String, Value>) -> Result<()> {
  point.insert("pdk_confirmed".into(), json!(cell(row, 1)? == "Yes"));
  point.insert("pdk_is_primary".into(), json!(cell(row, 2)? == "Yes"));
  Ok(())
}

fn recommendation_status(_: &Sanitizer, row: &StringRecord, point: &mut Map<String, Value>) -> Result<()> {
  if let Some(status) = row.get(6).filter(|s| !s.is_empty()) {
    point.insert("pdk_status".into(), json!(status));
  }
  Ok(())
}

/// Registration cells are optional; empty ones are left out.
fn registration_details(sanitizer: &Sanitizer, row: &StringRecord, point: &mut Map<String, Value>) -> Result<()> {
  if let Some(ip) = row.get(1).filter(|s| !s.is_empty()) {
    sanitizer.seal(point, "ip_address", ip)?;
  }
  if let Some(subscriptions) = row.get(2).filter(|s| !s.is_empty()) {
    point.insert("pdk_subscription_types".into(), json!(subscriptions));
  }
  Ok(())
}
