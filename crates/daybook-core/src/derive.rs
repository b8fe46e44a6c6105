//! Derivation policy: how a day's payload is computed from its inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inputs::DailyInputs;

/// The derived payload stored on a daily node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPayload {
  pub derived_category_code: Option<String>,
  pub raw_minutes:           i64,
  pub ext_minutes:           i64,
}

/// Whole minutes from a JSON number; fractions truncate toward zero.
fn whole_minutes(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
    _ => None,
  }
}

/// `ext_minutes` additionally accepts integer strings (`"10"`, `" -5 "`).
fn ext_minutes(value: &Value) -> Option<i64> {
  match value {
    Value::String(s) => s.trim().parse().ok(),
    other => whole_minutes(other),
  }
}

/// Apply the policy to one input set.
///
/// - `raw_minutes` sums numeric `minutes` across raw attendance payloads;
/// - override events run in order: a non-empty `derived_category_code` wins
///   over everything before it, and `ext_minutes` accumulates;
/// - values of the wrong shape are skipped, booleans included (`true` is not
///   a minute);
/// - sums saturate at the `i64` bounds.
pub fn derive(inputs: &DailyInputs) -> DerivedPayload {
  let raw_minutes: i64 = inputs
    .raw_attendance_events
    .iter()
    .filter_map(|event| event.parsed_payload().get("minutes").and_then(whole_minutes))
    .fold(0, i64::saturating_add);

  let mut derived_category_code = inputs.base_category_code.clone();
  let mut ext_total = 0i64;

  for event in &inputs.daily_node_events {
    let payload = event.parsed_payload();
    if let Some(code) = payload
      .get("derived_category_code")
      .and_then(Value::as_str)
      .filter(|code| !code.is_empty())
    {
      derived_category_code = Some(code.to_owned());
    }
    if let Some(delta) = payload.get("ext_minutes").and_then(ext_minutes) {
      ext_total = ext_total.saturating_add(delta);
    }
  }

  DerivedPayload { derived_category_code, raw_minutes, ext_minutes: ext_total }
}
