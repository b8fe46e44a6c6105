//! The obfuscated state-token codec.
//!
//! A token is built in two stages. A deterministic stage draws digits from a
//! [`DigitStream`] seeded by the day's events and maps each digit through a
//! freshly generated [`Dictionary`] to an [`InternalState`]. A randomised stage
//! then renders each state as one character picked from that state's Unicode
//! pool. Identical inputs therefore give textually different tokens that
//! decode to the same state sequence.
//!
//! This is obfuscation. Anyone holding the pool assignment can recover the
//! state sequence, and the dictionary recovers the digits; nothing here is a
//! confidentiality guarantee.

pub mod dictionary;
pub mod digits;
pub mod pools;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dictionary::{DictId, Dictionary, DictionaryRecord, DictionaryRegistry};
pub use digits::DigitStream;
pub use pools::UnicodePools;

use crate::{Result, inputs::EventRecord};

/// Token length used when none is configured.
pub const DEFAULT_TOKEN_LENGTH: usize = 64;

// ─── InternalState ───────────────────────────────────────────────────────────

/// One of the ten compact codes describing a day before obfuscation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum InternalState {
  #[serde(rename = "00")]
  Bits00,
  #[serde(rename = "01")]
  Bits01,
  #[serde(rename = "10")]
  Bits10,
  #[serde(rename = "11")]
  Bits11,
  #[serde(rename = "*0")]
  AnyThen0,
  #[serde(rename = "0*")]
  ZeroThenAny,
  #[serde(rename = "*1")]
  AnyThen1,
  #[serde(rename = "1*")]
  OneThenAny,
  #[serde(rename = "__")]
  Blank,
  #[serde(rename = "_")]
  Gap,
}

impl InternalState {
  pub const ALL: [Self; 10] = [
    Self::Bits00,
    Self::Bits01,
    Self::Bits10,
    Self::Bits11,
    Self::AnyThen0,
    Self::ZeroThenAny,
    Self::AnyThen1,
    Self::OneThenAny,
    Self::Blank,
    Self::Gap,
  ];

  /// The compact code; must match the serde renames above.
  pub fn code(self) -> &'static str {
    match self {
      Self::Bits00 => "00",
      Self::Bits01 => "01",
      Self::Bits10 => "10",
      Self::Bits11 => "11",
      Self::AnyThen0 => "*0",
      Self::ZeroThenAny => "0*",
      Self::AnyThen1 => "*1",
      Self::OneThenAny => "1*",
      Self::Blank => "__",
      Self::Gap => "_",
    }
  }

  /// Position in [`Self::ALL`].
  pub fn index(self) -> usize { self as usize }
}

// ─── Building and decoding ───────────────────────────────────────────────────

/// The deterministic half of a build: `length` states for an event set.
pub fn state_sequence(
  events: &[EventRecord],
  dictionary: &Dictionary,
  length: usize,
) -> Vec<InternalState> {
  DigitStream::for_events(events)
    .take(length)
    .map(|digit| dictionary.state_for(digit))
    .collect()
}

/// Build an opaque token of `length` characters for `events`.
pub fn build_state_token(
  events: &[EventRecord],
  dictionary: &Dictionary,
  pools: &UnicodePools,
  length: usize,
) -> String {
  pools.encode(&state_sequence(events, dictionary, length))
}

/// A token decoded through both the pools and its build's dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedState {
  pub dict_id: DictId,
  pub states:  Vec<InternalState>,
  pub digits:  Vec<u8>,
}

// ─── TokenCodec ──────────────────────────────────────────────────────────────

/// Pools plus dictionary registry: the process-wide codec state.
///
/// Construct once at startup and share it behind an [`Arc`]. Tests build
/// independent instances.
#[derive(Debug, Default)]
pub struct TokenCodec {
  pools:    UnicodePools,
  registry: DictionaryRegistry,
}

impl TokenCodec {
  /// Fresh OS-random pools and an empty registry.
  pub fn new() -> Self { Self::default() }

  /// Reuse a previously persisted pool partition.
  pub fn with_pools(pools: UnicodePools) -> Self {
    Self { pools, registry: DictionaryRegistry::new() }
  }

  pub fn pools(&self) -> &UnicodePools { &self.pools }

  pub fn registry(&self) -> &DictionaryRegistry { &self.registry }

  /// Register a new dictionary and build a token with it.
  pub fn issue(
    &self,
    events: &[EventRecord],
    length: usize,
  ) -> (Arc<DictionaryRecord>, String) {
    let record = self.registry.create();
    let token =
      build_state_token(events, &record.dictionary, &self.pools, length);
    (record, token)
  }

  /// Decode `token` with the dictionary in `record`.
  pub fn decode(
    &self,
    token: &str,
    record: &DictionaryRecord,
  ) -> Result<DecodedState> {
    let states = self.pools.decode(token)?;
    let digits = states
      .iter()
      .map(|state| record.dictionary.digit_for(*state))
      .collect();
    Ok(DecodedState { dict_id: record.dict_id.clone(), states, digits })
  }
}
