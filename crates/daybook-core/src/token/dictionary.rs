//! Digit dictionaries and the registry that holds them.

use std::{collections::{BTreeMap, HashMap}, fmt, sync::Arc};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use rand::{Rng, RngCore, rngs::OsRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::InternalState;

// ─── DictId ──────────────────────────────────────────────────────────────────

/// Opaque handle of a dictionary: 16 random bytes, URL-safe base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DictId(String);

impl DictId {
  pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Self(URL_SAFE_NO_PAD.encode(bytes))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl From<String> for DictId {
  fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for DictId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl fmt::Display for DictId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Dictionary ──────────────────────────────────────────────────────────────

/// A permutation of the ten internal states over the digit labels `0..=9`.
///
/// Serialised as `{"0": "<state>", …, "9": "<state>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
  try_from = "BTreeMap<String, InternalState>",
  into = "BTreeMap<String, InternalState>"
)]
pub struct Dictionary {
  by_digit: [InternalState; 10],
}

impl Dictionary {
  pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
    let mut by_digit = InternalState::ALL;
    by_digit.shuffle(rng);
    Self { by_digit }
  }

  /// The state labelled by `digit`; digits wrap modulo 10.
  pub fn state_for(&self, digit: u8) -> InternalState {
    self.by_digit[usize::from(digit % 10)]
  }

  /// Inverse of [`Self::state_for`].
  pub fn digit_for(&self, state: InternalState) -> u8 {
    // A permutation contains every state exactly once.
    self
      .by_digit
      .iter()
      .position(|s| *s == state)
      .map_or(0, |i| i as u8)
  }
}

impl From<Dictionary> for BTreeMap<String, InternalState> {
  fn from(d: Dictionary) -> Self {
    d.by_digit
      .iter()
      .enumerate()
      .map(|(digit, state)| (digit.to_string(), *state))
      .collect()
  }
}

impl TryFrom<BTreeMap<String, InternalState>> for Dictionary {
  type Error = String;

  fn try_from(map: BTreeMap<String, InternalState>) -> Result<Self, String> {
    if map.len() != 10 {
      return Err(format!("expected 10 digit labels, got {}", map.len()));
    }
    let mut by_digit = InternalState::ALL;
    let mut seen = [false; 10];
    for (label, state) in map {
      let digit: usize = label
        .parse()
        .ok()
        .filter(|d: &usize| *d < 10 && d.to_string() == label)
        .ok_or_else(|| format!("invalid digit label {label:?}"))?;
      if std::mem::replace(&mut seen[state.index()], true) {
        return Err(format!("state {:?} mapped twice", state.code()));
      }
      by_digit[digit] = state;
    }
    Ok(Self { by_digit })
  }
}

// ─── DictionaryRecord ────────────────────────────────────────────────────────

/// A dictionary together with the id it was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryRecord {
  pub dict_id:    DictId,
  #[serde(rename = "mapping")]
  pub dictionary: Dictionary,
}

// ─── DictionaryRegistry ──────────────────────────────────────────────────────

/// In-memory, lock-guarded map of `dict_id` to dictionary.
///
/// Contents do not survive the process; backends that persist dictionaries
/// feed them back through [`Self::insert`].
#[derive(Debug, Default)]
pub struct DictionaryRegistry {
  records: Mutex<HashMap<DictId, Arc<DictionaryRecord>>>,
}

impl DictionaryRegistry {
  pub fn new() -> Self { Self::default() }

  /// Generate, register and return a fresh OS-random dictionary.
  pub fn create(&self) -> Arc<DictionaryRecord> {
    let mut rng = OsRng;
    let record = Arc::new(DictionaryRecord {
      dict_id:    DictId::generate(&mut rng),
      dictionary: Dictionary::generate(&mut rng),
    });
    self
      .records
      .lock()
      .insert(record.dict_id.clone(), Arc::clone(&record));
    record
  }

  /// Register an existing record, e.g. one loaded from storage.
  pub fn insert(&self, record: DictionaryRecord) -> Arc<DictionaryRecord> {
    let record = Arc::new(record);
    self
      .records
      .lock()
      .insert(record.dict_id.clone(), Arc::clone(&record));
    record
  }

  pub fn get(&self, dict_id: &str) -> Option<Arc<DictionaryRecord>> {
    self.records.lock().get(&DictId::from(dict_id)).cloned()
  }

  /// Drop a record that was issued but never used.
  pub fn remove(&self, dict_id: &DictId) -> Option<Arc<DictionaryRecord>> {
    self.records.lock().remove(dict_id)
  }

  pub fn contains(&self, dict_id: &str) -> bool {
    self.records.lock().contains_key(&DictId::from(dict_id))
  }

  pub fn len(&self) -> usize { self.records.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
