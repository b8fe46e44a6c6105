//! The access gate in front of token decoding.
//!
//! This is an authorization pre-check, not a cryptographic proof: it only
//! confirms the caller names a dictionary this process knows and sits in an
//! allowed zone. It never touches the token itself.

use thiserror::Error;

use crate::token::DictionaryRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeAccessBlocked {
  #[error("missing dict_id")]
  MissingDictionary,

  #[error("unknown dict_id")]
  UnknownDictionary,

  #[error("caller is outside the allowed zone")]
  OutsideZone,

  #[error("dict_id does not belong to this node")]
  DictionaryMismatch,
}

/// Fail unless `dict_id` is present and registered and the caller is in an
/// allowed zone.
pub fn enforce_node_access(
  dict_id: Option<&str>,
  allowed_zone: bool,
  registry: &DictionaryRegistry,
) -> Result<(), NodeAccessBlocked> {
  let dict_id = dict_id
    .filter(|id| !id.is_empty())
    .ok_or(NodeAccessBlocked::MissingDictionary)?;
  if !registry.contains(dict_id) {
    return Err(NodeAccessBlocked::UnknownDictionary);
  }
  if !allowed_zone {
    return Err(NodeAccessBlocked::OutsideZone);
  }
  Ok(())
}
