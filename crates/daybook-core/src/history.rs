//! Calculation history: the append-only audit trail of node builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{canonical::InputsHash, derive::DerivedPayload};

/// What went into one build, as recorded at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcPayload {
  pub derived_category_code: Option<String>,
  pub ext_minutes:           i64,
  pub inputs_hash:           InputsHash,
  pub policy_version:        String,
  pub raw_minutes:           i64,
}

impl CalcPayload {
  pub fn new(
    inputs_hash: InputsHash,
    derived: &DerivedPayload,
    policy_version: impl Into<String>,
  ) -> Self {
    Self {
      derived_category_code: derived.derived_category_code.clone(),
      ext_minutes: derived.ext_minutes,
      inputs_hash,
      policy_version: policy_version.into(),
      raw_minutes: derived.raw_minutes,
    }
  }
}

/// A persisted history row. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcHistoryEntry {
  /// Store-assigned, increasing.
  pub entry_id:      i64,
  pub daily_node_id: Uuid,
  pub payload:       CalcPayload,
  pub recorded_at:   DateTime<Utc>,
}
