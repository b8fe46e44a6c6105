//! Canonical serialization and the inputs hash.
//!
//! The canonical form is compact JSON with object keys in lexicographic order.
//! Event sequences are normalised by serialising each event and sorting the
//! resulting strings, so the same set of events hashes identically whatever
//! order it was read in.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::inputs::{DailyInputs, EventRecord, FieldValue, SourceEvent};

/// Key of the wrapper emitted for values JSON cannot represent.
pub const RAW_WRAPPER_KEY: &str = "$raw";

// ─── Serializer ──────────────────────────────────────────────────────────────

fn write_str(out: &mut String, s: &str) {
  // `Value`'s Display escapes exactly as serde_json does and cannot fail.
  let _ = write!(out, "{}", Value::from(s));
}

fn write_field(out: &mut String, value: &FieldValue) {
  match value {
    FieldValue::Null => out.push_str("null"),
    FieldValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    FieldValue::Int(n) => {
      let _ = write!(out, "{n}");
    }
    FieldValue::Float(f) => match serde_json::Number::from_f64(*f) {
      Some(n) => {
        let _ = write!(out, "{n}");
      }
      None => {
        out.push('{');
        write_str(out, RAW_WRAPPER_KEY);
        out.push(':');
        write_str(out, &f.to_string());
        out.push('}');
      }
    },
    FieldValue::Text(s) => write_str(out, s),
  }
}

fn write_value(out: &mut String, value: &Value) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_value(out, item);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut entries: Vec<_> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (k, v)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_str(out, k);
        out.push(':');
        write_value(out, v);
      }
      out.push('}');
    }
    scalar => {
      let _ = write!(out, "{scalar}");
    }
  }
}

/// Canonical JSON for one flat event record.
pub fn canonical_record(record: &EventRecord) -> String {
  let mut out = String::from("{");
  // BTreeMap iterates in key order already.
  for (i, (k, v)) in record.iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    write_str(&mut out, k);
    out.push(':');
    write_field(&mut out, v);
  }
  out.push('}');
  out
}

/// Canonical JSON array for an unordered collection of event records.
pub fn canonical_sequence(records: &[EventRecord]) -> String {
  let mut items: Vec<String> = records.iter().map(canonical_record).collect();
  items.sort();
  format!("[{}]", items.join(","))
}

/// Canonical JSON for an arbitrary JSON value, independent of how the map
/// type orders its keys.
pub fn canonical_value(value: &Value) -> String {
  let mut out = String::new();
  write_value(&mut out, value);
  out
}

/// Canonical JSON for a full rebuild input set.
pub fn canonical_inputs(inputs: &DailyInputs) -> String {
  let records = |events: &[SourceEvent]| -> Vec<EventRecord> {
    events.iter().map(SourceEvent::record).collect()
  };

  let mut out = String::from("{");
  write_str(&mut out, "base_category_code");
  out.push(':');
  match &inputs.base_category_code {
    Some(code) => write_str(&mut out, code),
    None => out.push_str("null"),
  }
  out.push(',');
  write_str(&mut out, "daily_node_events");
  out.push(':');
  out.push_str(&canonical_sequence(&records(&inputs.daily_node_events)));
  out.push(',');
  write_str(&mut out, "policy_version");
  out.push(':');
  write_str(&mut out, &inputs.policy_version);
  out.push(',');
  write_str(&mut out, "raw_attendance_events");
  out.push(':');
  out.push_str(&canonical_sequence(&records(&inputs.raw_attendance_events)));
  out.push('}');
  out
}

// ─── Hashing ─────────────────────────────────────────────────────────────────

pub fn sha256(bytes: &[u8]) -> [u8; 32] { Sha256::digest(bytes).into() }

/// Lowercase hex SHA-256 of the canonical inputs; the idempotency fingerprint
/// of a daily node build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputsHash(String);

impl InputsHash {
  pub fn of_bytes(bytes: &[u8]) -> Self { Self(hex::encode(sha256(bytes))) }

  pub fn of_inputs(inputs: &DailyInputs) -> Self {
    Self::of_bytes(canonical_inputs(inputs).as_bytes())
  }

  /// Wrap a digest previously produced by this type (e.g. read from storage).
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for InputsHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
