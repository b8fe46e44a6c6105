//! Unicode pools: the rendering half of the codec.
//!
//! The alphabet draws from three disjoint scripts so that token text carries
//! no obvious structure. It is shuffled once and dealt round-robin into ten
//! pools, one per [`InternalState`].

use std::collections::HashMap;

use rand::{Rng, rngs::OsRng, seq::SliceRandom};

use super::InternalState;
use crate::{Error, Result};

/// Latin letters, Thai consonants, then Arabic letters.
pub fn alphabet() -> Vec<char> {
  let latin = ('A'..='Z').chain('a'..='z');
  let thai = '\u{0E01}'..='\u{0E2E}';
  let arabic = ('\u{0621}'..='\u{063A}').chain('\u{0641}'..='\u{064A}');
  latin.chain(thai).chain(arabic).collect()
}

/// Disjoint per-state character pools with a reverse lookup.
///
/// Read-only after construction, so shared references are safe across
/// threads without locking.
#[derive(Debug, Clone)]
pub struct UnicodePools {
  pools:   [Vec<char>; 10],
  reverse: HashMap<char, InternalState>,
}

impl Default for UnicodePools {
  fn default() -> Self { Self::generate(&mut OsRng) }
}

impl UnicodePools {
  /// Shuffle the alphabet with `rng` and deal it into ten pools.
  pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
    let mut chars = alphabet();
    chars.shuffle(rng);
    let mut pools: [Vec<char>; 10] = Default::default();
    for (i, c) in chars.into_iter().enumerate() {
      pools[i % pools.len()].push(c);
    }
    Self::from_pools(pools)
  }

  /// Restore a partition produced by [`Self::partition`].
  ///
  /// Every pool must be non-empty, the pools must be pairwise disjoint, and
  /// together they must cover exactly [`alphabet`].
  pub fn from_partition(partition: Vec<Vec<char>>) -> Result<Self> {
    let pools: [Vec<char>; 10] = partition.try_into().map_err(|p: Vec<_>| {
      Error::InvalidPoolPartition(format!("expected 10 pools, got {}", p.len()))
    })?;

    if pools.iter().any(Vec::is_empty) {
      return Err(Error::InvalidPoolPartition("empty pool".into()));
    }

    let mut all: Vec<char> = pools.iter().flatten().copied().collect();
    all.sort_unstable();
    let before = all.len();
    all.dedup();
    if all.len() != before {
      return Err(Error::InvalidPoolPartition("pools overlap".into()));
    }
    let mut expected = alphabet();
    expected.sort_unstable();
    if all != expected {
      return Err(Error::InvalidPoolPartition(
        "pools do not cover the alphabet".into(),
      ));
    }

    Ok(Self::from_pools(pools))
  }

  fn from_pools(pools: [Vec<char>; 10]) -> Self {
    let reverse = InternalState::ALL
      .iter()
      .zip(&pools)
      .flat_map(|(state, pool)| pool.iter().map(move |c| (*c, *state)))
      .collect();
    Self { pools, reverse }
  }

  /// The pools in [`InternalState::ALL`] order, for persistence.
  pub fn partition(&self) -> Vec<Vec<char>> { self.pools.to_vec() }

  pub fn pool(&self, state: InternalState) -> &[char] { &self.pools[state.index()] }

  /// Render each state as one OS-random character from its pool.
  pub fn encode(&self, states: &[InternalState]) -> String {
    let mut rng = OsRng;
    states
      .iter()
      .filter_map(|state| self.pool(*state).choose(&mut rng).copied())
      .collect()
  }

  /// Map each character back to its state.
  pub fn decode(&self, token: &str) -> Result<Vec<InternalState>> {
    token
      .chars()
      .map(|c| self.reverse.get(&c).copied().ok_or(Error::UnknownTokenSymbol(c)))
      .collect()
  }
}
