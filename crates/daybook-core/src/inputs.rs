//! Input rows consumed by a daily rebuild.
//!
//! Events arrive from collaborators as opaque rows (`event_type` plus a JSON
//! payload stored as text). Nothing here trusts the payload text: parsing is
//! lenient and degrades instead of failing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag stamped on every input set and calc-history entry.
pub const POLICY_VERSION: &str = "v1";

/// Key of the month profile that supplies a day's base category.
pub fn month_key(date: NaiveDate) -> String { date.format("%Y-%m").to_string() }

// ─── Event records ───────────────────────────────────────────────────────────

/// A scalar field of a flat event record.
///
/// Integers and floats are kept apart so `1` and `1.0` never hash the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

impl From<&str> for FieldValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for FieldValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for FieldValue {
  fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<f64> for FieldValue {
  fn from(n: f64) -> Self { Self::Float(n) }
}

impl From<bool> for FieldValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

/// A flat mapping of field name to scalar. Key order is irrelevant.
pub type EventRecord = BTreeMap<String, FieldValue>;

// ─── Source events ───────────────────────────────────────────────────────────

/// One raw attendance event or override ("daily node") event as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
  pub event_type: String,
  /// JSON text as written by the producer; may be malformed or absent.
  pub payload:    Option<String>,
}

impl SourceEvent {
  pub fn new(event_type: impl Into<String>, payload: Option<String>) -> Self {
    Self { event_type: event_type.into(), payload }
  }

  /// Convenience constructor serialising `payload` as the payload text.
  pub fn with_json(event_type: impl Into<String>, payload: &Value) -> Self {
    Self::new(event_type, Some(payload.to_string()))
  }

  /// The flat record form used for hashing and export.
  pub fn record(&self) -> EventRecord {
    let mut record = EventRecord::new();
    record.insert("event_type".into(), self.event_type.as_str().into());
    record.insert("payload".into(), self.payload.clone().into());
    record
  }

  /// The parsed payload; see [`parse_payload`].
  pub fn parsed_payload(&self) -> Map<String, Value> {
    parse_payload(self.payload.as_deref())
  }
}

/// Parse payload text into a JSON object.
///
/// - absent or empty text yields an empty object;
/// - text that is not JSON yields `{"raw": <text>}`;
/// - JSON that is not an object yields `{"value": <json>}`.
pub fn parse_payload(raw: Option<&str>) -> Map<String, Value> {
  let Some(raw) = raw.filter(|s| !s.is_empty()) else {
    return Map::new();
  };
  let mut wrapped = Map::new();
  match serde_json::from_str::<Value>(raw) {
    Ok(Value::Object(map)) => return map,
    Ok(other) => {
      wrapped.insert("value".into(), other);
    }
    Err(_) => {
      wrapped.insert("raw".into(), Value::String(raw.to_owned()));
    }
  }
  wrapped
}

// ─── DailyInputs ─────────────────────────────────────────────────────────────

/// Everything a rebuild of one (subject, date) depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInputs {
  pub raw_attendance_events: Vec<SourceEvent>,
  pub base_category_code:    Option<String>,
  pub daily_node_events:     Vec<SourceEvent>,
  pub policy_version:        String,
}

impl DailyInputs {
  pub fn new(
    raw_attendance_events: Vec<SourceEvent>,
    base_category_code: Option<String>,
    daily_node_events: Vec<SourceEvent>,
  ) -> Self {
    Self {
      raw_attendance_events,
      base_category_code,
      daily_node_events,
      policy_version: POLICY_VERSION.to_owned(),
    }
  }

  /// Raw events followed by override events, as flat records. This is the
  /// event set that seeds the state token.
  pub fn event_records(&self) -> Vec<EventRecord> {
    self
      .raw_attendance_events
      .iter()
      .chain(&self.daily_node_events)
      .map(SourceEvent::record)
      .collect()
  }
}
