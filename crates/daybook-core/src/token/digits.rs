//! Deterministic decimal digit stream.
//!
//! Block `n` is `SHA-256(seed || n as u32 big-endian)`; every byte of a block
//! yields one digit (`byte % 10`) before the counter advances.

use sha2::{Digest, Sha256};

use crate::{canonical, inputs::EventRecord};

/// An endless iterator of digits `0..=9` derived from a 32-byte seed.
#[derive(Debug, Clone)]
pub struct DigitStream {
  seed:    [u8; 32],
  counter: u32,
  block:   [u8; 32],
  cursor:  usize,
}

impl DigitStream {
  pub fn new(seed: [u8; 32]) -> Self {
    let mut stream = Self { seed, counter: 0, block: [0; 32], cursor: 0 };
    stream.block = stream.hash_block();
    stream
  }

  /// Seed the stream from an event set: SHA-256 of its canonical sequence.
  pub fn for_events(events: &[EventRecord]) -> Self {
    let normalised = canonical::canonical_sequence(events);
    Self::new(canonical::sha256(normalised.as_bytes()))
  }

  fn hash_block(&self) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(self.seed);
    hasher.update(self.counter.to_be_bytes());
    hasher.finalize().into()
  }
}

impl Iterator for DigitStream {
  type Item = u8;

  fn next(&mut self) -> Option<u8> {
    if self.cursor == self.block.len() {
      self.counter = self.counter.wrapping_add(1);
      self.block = self.hash_block();
      self.cursor = 0;
    }
    let digit = self.block[self.cursor] % 10;
    self.cursor += 1;
    Some(digit)
  }
}
