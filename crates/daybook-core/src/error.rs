//! Error types for `daybook-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::access::NodeAccessBlocked;

#[derive(Debug, Error)]
pub enum Error {
  #[error("token symbol {0:?} does not belong to any pool")]
  UnknownTokenSymbol(char),

  #[error("invalid pool partition: {0}")]
  InvalidPoolPartition(String),

  #[error("node access blocked: {0}")]
  AccessBlocked(#[from] NodeAccessBlocked),

  #[error("daily node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("no active daily node for {subject_id} on {date}")]
  NoActiveNode {
    subject_id: String,
    date:       chrono::NaiveDate,
  },

  #[error("gave up after {attempts} conflicting rebuild attempts")]
  VersionConflict { attempts: u32 },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error, erasing its concrete type.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
