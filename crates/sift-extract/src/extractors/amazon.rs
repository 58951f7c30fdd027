//! Amazon order history (a bare CSV, not a zip).
//!
//! Column names changed between export versions, so every field lists the
//! headers it may appear under. After the rows are imported the uploaded
//! file is rewritten without the columns in [`DROP_COLUMNS`].

use std::{collections::HashMap, fs, path::Path};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value, json};
use sift_core::{engagement::Engagement, record::generator_id};
use tracing::{debug, info};

use super::{EventDescription, Extractor, owned_by};
use crate::{Error, Result, context::ImportContext, timestamp::TimestampFormat};

const SERVICE: &str = "amazon";

const ORDER_DATE: &[TimestampFormat] = &[
  TimestampFormat::LocalNoon("%m/%d/%y"),
  TimestampFormat::LocalNoon("%m/%d/%Y"),
];

const RELEASE_DATE: &[TimestampFormat] = &[
  TimestampFormat::LocalNoon("%m/%d/%y"),
  TimestampFormat::LocalNoon("%m/%d/%Y"),
  TimestampFormat::Iso8601,
];

/// Order rows in periods without purchases carry this instead of a date.
const NO_DATA: &str = "No data found for this time period";

/// Columns removed from the uploaded file once it has been imported.
pub const DROP_COLUMNS: &[&str] = &[
  "Payment Instrument Type",
  "Purchase Order Number",
  "PO Line Number",
  "Ordering Customer Email",
  "Shipping Address Name",
  "Shipping Address Street 1",
  "Shipping Address Street 2",
  "Shipping Address City",
  "Shipping Address State",
  "Shipping Address Zip",
  "Carrier Name & Tracking Number",
  "Buyer Name",
  "Group Name",
  "Account Group",
  "PO Number",
  "Payment Reference ID",
  "Payment Date",
  "Payment Amount",
  "Payment Identifier",
  "Company Compliance",
  "Receiving Status",
  "Received Quantity",
  "Received Date",
  "Receiver Name",
  "Receiver Email",
  "GL Code",
  "Department",
  "Cost Center",
  "Project Code",
  "Approver",
  "Order Receiving Status",
  "Order Received Quantity",
  "Account User",
  "Account User Email",
];

/// `(field, headers)`: the first non-empty header wins.
const FIELDS: &[(&str, &[&str])] = &[
  ("item", &["Title"]),
  ("category", &["Category", "Segment"]),
  ("asin", &["ASIN/ISBN", "ASIN"]),
  ("unspc_code", &["UNSPSC Code", "UNSPSC"]),
  ("website", &["Website"]),
  ("condition", &["Condition", "Product Condition"]),
  ("seller", &["Seller", "Seller Name"]),
  ("seller_credentials", &["Seller Credentials"]),
  ("list_price", &["List Price Per Unit", "Listed PPU"]),
  ("purchase_price", &["Purchase Price Per Unit", "Purchase PPU"]),
  ("purchase_subtotal", &["Item Subtotal"]),
  ("purchase_tax", &["Item Subtotal Tax", "Item Tax"]),
  ("purchase_total", &["Item Total", "Item Net Total"]),
  ("tax_exemption_applied", &["Tax Exemption Applied"]),
  ("tax_exemption_type", &["Tax Exemption Type"]),
  ("exemption_opt_out", &["Exemption Opt-Out", "Tax Exemption Opt Out"]),
  ("currency", &["Currency"]),
  ("quantity", &["Quantity", "Item Quantity"]),
  ("zipcode", &["Shipping Address Zip", "Seller ZipCode"]),
  ("status", &["Order Status"]),
];

pub struct Amazon;

impl Extractor for Amazon {
  fn service_id(&self) -> &'static str { SERVICE }

  fn import(&self, ctx: &mut ImportContext<'_>, path: &Path) -> Result<()> {
    let text = decode_text(&fs::read(path)?);
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    for row in reader.records() {
      let row = row?;
      let cells: HashMap<&str, &str> = headers
        .iter()
        .zip(row.iter())
        .filter(|(_, v)| !is_missing(v))
        .collect();
      import_row(ctx, &cells)?;
    }

    strip_columns(path, &text)?;
    Ok(())
  }

  fn describe_event(&self, generator_id: &str, _properties: &Map<String, Value>) -> Option<EventDescription> {
    let described = owned_by(SERVICE, "Amazon", generator_id)?;
    if generator_id == sift_core::record::generator_id(SERVICE, "item") {
      return Some(EventDescription::new("Amazon", "Purchase").outgoing());
    }
    Some(described)
  }
}

/// UTF-8 when valid, otherwise each byte is read as Windows-1252/Latin-1.
fn decode_text(bytes: &[u8]) -> String {
  let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
  match std::str::from_utf8(bytes) {
    Ok(text) => text.to_owned(),
    Err(_) => {
      debug!(service = SERVICE, "order history is not UTF-8; reading as Latin-1");
      bytes.iter().map(|&b| char::from(b)).collect()
    }
  }
}

/// Empty and `NaN` cells count as absent.
fn is_missing(cell: &str) -> bool {
  let cell = cell.trim();
  cell.is_empty() || cell.eq_ignore_ascii_case("nan")
}

fn local_date(ctx: &ImportContext<'_>, at: DateTime<Utc>) -> NaiveDate {
  at.with_timezone(&ctx.local_zone()).date_naive()
}

fn import_row(ctx: &mut ImportContext<'_>, cells: &HashMap<&str, &str>) -> Result<()> {
  let Some(ordered) = cells.get("Order Date").copied() else {
    return Ok(());
  };
  if ordered == NO_DATA {
    return Ok(());
  }

  let at = ctx.timestamp_str(ordered, ORDER_DATE)?;
  let raw = json!(cells);
  if !ctx.include(at, &raw) {
    return Ok(());
  }

  let mut point = Map::new();
  for (field, headers) in FIELDS {
    if let Some(value) = headers.iter().find_map(|h| cells.get(h)) {
      point.insert((*field).to_owned(), json!(value));
    }
  }
  if !point.contains_key("item") {
    return Err(Error::MissingField("Title".into()));
  }

  let carrier = cells
    .get("Carrier Name & Tracking Number")
    .and_then(|c| c.split('(').next())
    .unwrap_or_default();
  point.insert("carrier_name".into(), json!(carrier));
  point.insert("ordered".into(), json!(local_date(ctx, at).to_string()));

  if let Some(shipped) = cells.get("Shipment Date") {
    let shipped = ctx.timestamp_str(shipped, ORDER_DATE)?;
    point.insert("shipped".into(), json!(local_date(ctx, shipped).to_string()));
  }
  if let Some(released) = cells.get("Release Date") {
    let released = ctx.timestamp_str(released, RELEASE_DATE)?;
    point.insert("released".into(), json!(local_date(ctx, released).to_string()));
  }

  let order_id = cells
    .get("Order ID")
    .ok_or_else(|| Error::MissingField("Order ID".into()))?;
  ctx.sanitizer().hash(&mut point, "order_id", order_id);

  ctx.emit(generator_id(SERVICE, "item"), point, at)?;
  ctx.engage(Engagement::new(SERVICE, "purchase").outgoing(1.0), at)
}

/// Rewrite the CSV at `path` without [`DROP_COLUMNS`]. The new file is
/// written beside the original and renamed over it.
fn strip_columns(path: &Path, text: &str) -> Result<()> {
  let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
  let headers = reader.headers()?.clone();
  let keep: Vec<usize> = headers
    .iter()
    .enumerate()
    .filter(|(_, h)| !DROP_COLUMNS.contains(h))
    .map(|(i, _)| i)
    .collect();
  if keep.len() == headers.len() {
    return Ok(());
  }

  let staging = path.with_extension("csv.partial");
  {
    let mut writer = csv::Writer::from_path(&staging)?;
    writer.write_record(keep.iter().filter_map(|&i| headers.get(i)))?;
    for row in reader.records() {
      let row = row?;
      writer.write_record(keep.iter().map(|&i| row.get(i).unwrap_or_default()))?;
    }
    writer.flush()?;
  }
  fs::rename(&staging, path)?;

  info!(
    service = SERVICE,
    path = %path.display(),
    dropped = headers.len() - keep.len(),
    "removed sensitive columns from upload"
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use chrono_tz::America;

  use super::*;
  use crate::testing::{file_fixture, import_path, import_path_in};

  const ORDERS: &str = "\
Order Date,Order ID,Title,Category,ASIN/ISBN,Item Subtotal,Currency,Quantity,Shipment Date,Shipping Address Name,Shipping Address Zip,Carrier Name & Tracking Number
1/5/23,111-222,Rust in Action,Book,1617294551,$39.99,USD,1,1/7/2023,Ada Lovelace,60601,UPS(1Z999)
No data found for this time period,,,,,,,,,,,
12/25/2019,333-444,Cast iron pan,Kitchen,B000,$20.00,USD,NaN,,Ada Lovelace,60601,
";

  #[test]
  fn orders_become_items_at_local_noon() {
    let (_dir, path) = file_fixture("orders.csv", ORDERS.as_bytes());
    let out = import_path_in(&Amazon, &path, America::Chicago).unwrap();

    let items = out.generator("pdk-external-amazon-item");
    assert_eq!(items.len(), 2);

    let book = &items[0];
    assert_eq!(book.occurred_at, Utc.with_ymd_and_hms(2023, 1, 5, 18, 0, 0).unwrap());
    assert_eq!(book.properties["item"], "Rust in Action");
    assert_eq!(book.properties["asin"], "1617294551");
    assert_eq!(book.properties["ordered"], "2023-01-05");
    assert_eq!(book.properties["shipped"], "2023-01-07");
    assert_eq!(book.properties["carrier_name"], "UPS");
    assert!(book.properties.get("pdk_hashed_order_id").is_some());
    assert!(book.properties.get("Order ID").is_none());

    let pan = &items[1].properties;
    assert!(pan.get("quantity").is_none());
    assert!(pan.get("shipped").is_none());
    assert_eq!(pan["carrier_name"], "");

    assert_eq!(out.generator("pdk-external-engagement-amazon").len(), 2);
  }

  #[test]
  fn upload_is_rewritten_without_sensitive_columns() {
    let (_dir, path) = file_fixture("orders.csv", ORDERS.as_bytes());
    import_path(&Amazon, &path).unwrap();

    let rewritten = fs::read_to_string(&path).unwrap();
    let header = rewritten.lines().next().unwrap();
    assert!(header.starts_with("Order Date,Order ID,Title"));
    assert!(!header.contains("Shipping Address Name"));
    assert!(!header.contains("Carrier Name"));
    assert!(!rewritten.contains("Ada Lovelace"));
    assert!(!path.with_extension("csv.partial").exists());
  }

  #[test]
  fn latin1_uploads_are_readable() {
    let mut bytes = b"Order Date,Order ID,Title\n3/4/21,9,Caf".to_vec();
    bytes.extend([0xE9, b'\n']);
    let (_dir, path) = file_fixture("orders.csv", &bytes);

    let out = import_path(&Amazon, &path).unwrap();
    assert_eq!(out.generator("pdk-external-amazon-item")[0].properties["item"], "Café");
  }

  #[test]
  fn missing_titles_fail_the_import() {
    let (_dir, path) = file_fixture("orders.csv", b"Order Date,Order ID\n3/4/21,9\n");
    assert!(import_path(&Amazon, &path).is_err());
  }
}
