//! Daily nodes, the unit of versioned truth for one (subject, date) pair.
//!
//! A node is never updated in place. A rebuild with changed inputs inserts a
//! new version and back-fills only `status`, `valid_to` and
//! `superseded_by_id` on the version it replaces.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{canonical::InputsHash, token::DictId};

// ─── SubjectId ───────────────────────────────────────────────────────────────

/// Opaque identifier of the subject (a child) a node describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for SubjectId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for SubjectId {
  fn from(s: String) -> Self { Self(s) }
}

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
  Active,
  Superseded,
}

impl NodeStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "ACTIVE",
      Self::Superseded => "SUPERSEDED",
    }
  }
}

// ─── DailyNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyNode {
  pub id:                    Uuid,
  pub subject_id:            SubjectId,
  pub date:                  NaiveDate,
  /// Starts at 1 for each (subject, date) and increases by one per version.
  pub version:               u32,
  pub status:                NodeStatus,
  pub valid_from:            DateTime<Utc>,
  /// `None` while the node is active.
  pub valid_to:              Option<DateTime<Utc>>,
  pub supersedes_id:         Option<Uuid>,
  pub superseded_by_id:      Option<Uuid>,
  /// Shared by every version of one (subject, date).
  pub statement_id:          Uuid,
  pub change_reason_code:    String,
  pub change_note:           Option<String>,
  pub inputs_hash:           InputsHash,
  pub derived_category_code: Option<String>,
  pub raw_minutes:           i64,
  pub ext_minutes:           i64,
  pub state_token:           String,
  pub dict_id:               DictId,
}

impl DailyNode {
  pub fn is_active(&self) -> bool { self.status == NodeStatus::Active }
}

// ─── Rebuild outcome ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildAction {
  /// First version for the (subject, date).
  Created,
  /// Inputs changed; a new version replaced the active one.
  Superseded,
  /// Inputs unchanged; nothing was written.
  Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildOutcome {
  pub action: RebuildAction,
  pub node:   DailyNode,
}
