//! Export-shaped node values handed to external callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  inputs::EventRecord,
  node::SubjectId,
  node_key::{NodeKey, NodeSecret, compact_date},
  token::{DictId, DictionaryRegistry, UnicodePools, build_state_token},
};

/// Format version of [`NodeExport`].
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExport {
  pub v:           u32,
  /// Standard base64 of the node key.
  pub node_key:    String,
  pub prefix12:    String,
  /// `YYYYMMDD`.
  pub date:        String,
  pub state_token: String,
  pub dict_id:     DictId,
  pub events:      Vec<EventRecord>,
  /// Reserved for derived values; always empty for now.
  pub derived:     Map<String, Value>,
}

/// Build an export for `events`, registering a fresh dictionary.
pub fn build_node(
  secret: &NodeSecret,
  subject_id: &SubjectId,
  date: NaiveDate,
  events: &[EventRecord],
  registry: &DictionaryRegistry,
  pools: &UnicodePools,
  token_length: usize,
) -> NodeExport {
  let record = registry.create();
  let key = NodeKey::derive(secret, subject_id, date);
  NodeExport {
    v:           EXPORT_VERSION,
    node_key:    key.encoded(),
    prefix12:    key.prefix12(),
    date:        compact_date(date),
    state_token: build_state_token(events, &record.dictionary, pools, token_length),
    dict_id:     record.dict_id.clone(),
    events:      events.to_vec(),
    derived:     Map::new(),
  }
}
