//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates `YYYY-MM-DD`, UUIDs
//! hyphenated lowercase. Structured values (calc payloads, dictionaries, pool
//! partitions) are compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use daybook_core::{
  canonical::{InputsHash, canonical_value},
  history::{CalcHistoryEntry, CalcPayload},
  node::{DailyNode, NodeStatus, SubjectId},
  token::DictId,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NodeStatus ──────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<NodeStatus> {
  match s {
    "ACTIVE" => Ok(NodeStatus::Active),
    "SUPERSEDED" => Ok(NodeStatus::Superseded),
    other => Err(Error::Decode { column: "status", value: other.to_owned() }),
  }
}

// ─── CalcPayload ─────────────────────────────────────────────────────────────

/// Canonical JSON, so equal payloads are byte-identical on disk.
pub fn encode_calc_payload(payload: &CalcPayload) -> Result<String> {
  Ok(canonical_value(&serde_json::to_value(payload)?))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawDailyNode::from_row`].
pub const NODE_COLUMNS: &str = "
  id, subject_id, date, version, status, valid_from, valid_to,
  supersedes_id, superseded_by_id, change_reason_code, change_note,
  statement_id, inputs_hash, derived_category_code, raw_minutes,
  ext_minutes, state_token, dict_id";

/// Raw values read directly from a `daily_nodes` row.
pub struct RawDailyNode {
  pub id:                    String,
  pub subject_id:            String,
  pub date:                  String,
  pub version:               u32,
  pub status:                String,
  pub valid_from:            String,
  pub valid_to:              Option<String>,
  pub supersedes_id:         Option<String>,
  pub superseded_by_id:      Option<String>,
  pub change_reason_code:    String,
  pub change_note:           Option<String>,
  pub statement_id:          String,
  pub inputs_hash:           String,
  pub derived_category_code: Option<String>,
  pub raw_minutes:           i64,
  pub ext_minutes:           i64,
  pub state_token:           String,
  pub dict_id:               String,
}

impl RawDailyNode {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                    row.get(0)?,
      subject_id:            row.get(1)?,
      date:                  row.get(2)?,
      version:               row.get(3)?,
      status:                row.get(4)?,
      valid_from:            row.get(5)?,
      valid_to:              row.get(6)?,
      supersedes_id:         row.get(7)?,
      superseded_by_id:      row.get(8)?,
      change_reason_code:    row.get(9)?,
      change_note:           row.get(10)?,
      statement_id:          row.get(11)?,
      inputs_hash:           row.get(12)?,
      derived_category_code: row.get(13)?,
      raw_minutes:           row.get(14)?,
      ext_minutes:           row.get(15)?,
      state_token:           row.get(16)?,
      dict_id:               row.get(17)?,
    })
  }

  pub fn into_node(self) -> Result<DailyNode> {
    Ok(DailyNode {
      id:                    decode_uuid(&self.id)?,
      subject_id:            SubjectId::from(self.subject_id),
      date:                  decode_date(&self.date)?,
      version:               self.version,
      status:                decode_status(&self.status)?,
      valid_from:            decode_dt(&self.valid_from)?,
      valid_to:              self.valid_to.as_deref().map(decode_dt).transpose()?,
      supersedes_id:         self.supersedes_id.as_deref().map(decode_uuid).transpose()?,
      superseded_by_id:      self
        .superseded_by_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      change_reason_code:    self.change_reason_code,
      change_note:           self.change_note,
      statement_id:          decode_uuid(&self.statement_id)?,
      inputs_hash:           InputsHash::from_hex(self.inputs_hash),
      derived_category_code: self.derived_category_code,
      raw_minutes:           self.raw_minutes,
      ext_minutes:           self.ext_minutes,
      state_token:           self.state_token,
      dict_id:               DictId::from(self.dict_id),
    })
  }
}

/// Raw values read directly from a `calc_history` row.
pub struct RawCalcHistory {
  pub entry_id:      i64,
  pub daily_node_id: String,
  pub payload:       String,
  pub recorded_at:   String,
}

impl RawCalcHistory {
  pub fn into_entry(self) -> Result<CalcHistoryEntry> {
    Ok(CalcHistoryEntry {
      entry_id:      self.entry_id,
      daily_node_id: decode_uuid(&self.daily_node_id)?,
      payload:       serde_json::from_str(&self.payload)?,
      recorded_at:   decode_dt(&self.recorded_at)?,
    })
  }
}
