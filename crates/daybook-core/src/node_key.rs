//! Node key derivation.
//!
//! `node_key = HMAC-SHA256(secret, "{subject_id}|{YYYYMMDD}")`, exposed as a
//! URL-safe lookup key, a standard base64 encoding for exported payloads, and
//! a 12-character prefix usable as a partial index.

use std::fmt;

use base64::{
  Engine as _,
  engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::node::SubjectId;

type HmacSha256 = Hmac<Sha256>;

/// Length of [`NodeKey::prefix12`].
pub const PREFIX_LEN: usize = 12;

/// The shared HMAC secret. `Debug` never prints the value.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct NodeSecret(String);

impl NodeSecret {
  pub fn new(secret: impl Into<String>) -> Self { Self(secret.into()) }

  fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
}

impl fmt::Debug for NodeSecret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("NodeSecret(<redacted>)")
  }
}

/// Compact date form used in node keys and exports.
pub fn compact_date(date: NaiveDate) -> String { date.format("%Y%m%d").to_string() }

/// A derived 32-byte node key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NodeKey([u8; 32]);

impl NodeKey {
  pub fn derive(secret: &NodeSecret, subject_id: &SubjectId, date: NaiveDate) -> Self {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
      .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
    mac.update(subject_id.as_str().as_bytes());
    mac.update(b"|");
    mac.update(compact_date(date).as_bytes());
    Self(mac.finalize().into_bytes().into())
  }

  pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

  /// URL-safe, unpadded base64; the index handle.
  pub fn lookup_key(&self) -> String { URL_SAFE_NO_PAD.encode(self.0) }

  /// Standard, padded base64; embedded in exports.
  pub fn encoded(&self) -> String { STANDARD.encode(self.0) }

  pub fn prefix12(&self) -> String {
    self.lookup_key().chars().take(PREFIX_LEN).collect()
  }
}

impl fmt::Debug for NodeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "NodeKey({}…)", self.prefix12())
  }
}
