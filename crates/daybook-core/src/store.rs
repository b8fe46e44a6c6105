//! The `LedgerStore` trait and the commit types it accepts.
//!
//! The trait is implemented by storage backends (e.g. `daybook-store-sqlite`).
//! The versioning engine in [`crate::ledger`] depends on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  history::{CalcHistoryEntry, CalcPayload},
  inputs::SourceEvent,
  node::{DailyNode, SubjectId},
  token::{DictId, DictionaryRecord},
};

// ─── Commit types ────────────────────────────────────────────────────────────

/// Everything written by one rebuild, applied as a single atomic unit.
#[derive(Debug, Clone)]
pub struct VersionCommit {
  /// The active node being replaced, if any. It is marked superseded with
  /// `valid_to = node.valid_from` and `superseded_by_id = node.id`.
  pub retiring:   Option<Uuid>,
  /// The new active node.
  pub node:       DailyNode,
  /// The calc-history entry for `node`.
  pub history:    CalcPayload,
  /// The dictionary `node.state_token` was built with.
  pub dictionary: DictionaryRecord,
}

/// Result of [`LedgerStore::commit_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  Committed,
  /// Another writer changed the active node first; nothing was written.
  Conflict,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a daybook storage backend.
///
/// Node rows are append-only apart from the supersession back-fill performed
/// inside [`Self::commit_version`]. Backends must guarantee that at most one
/// node per (subject, date) is active, and report a lost race as
/// [`CommitOutcome::Conflict`] rather than an error.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Inputs ────────────────────────────────────────────────────────────

  /// Raw attendance events for the day, in arrival order.
  fn raw_events(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<SourceEvent>, Self::Error>> + Send + '_;

  /// Override ("daily node") events for the day, in arrival order.
  fn override_events(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<SourceEvent>, Self::Error>> + Send + '_;

  /// Base category from the subject's profile for `month` (`YYYY-MM`).
  fn base_category(
    &self,
    subject_id: SubjectId,
    month: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn append_raw_event(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
    event: SourceEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn append_override_event(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
    event: SourceEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Create or replace the month profile's base category.
  fn set_base_category(
    &self,
    subject_id: SubjectId,
    month: String,
    code: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Nodes ─────────────────────────────────────────────────────────────

  fn active_node(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<DailyNode>, Self::Error>> + Send + '_;

  /// All versions for the day, highest version first.
  fn node_history(
    &self,
    subject_id: SubjectId,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<DailyNode>, Self::Error>> + Send + '_;

  fn node(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DailyNode>, Self::Error>> + Send + '_;

  /// History entries for a node, oldest first.
  fn calc_history(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CalcHistoryEntry>, Self::Error>> + Send + '_;

  /// Atomically retire the previous version (if any), insert the new node,
  /// append its history entry and persist its dictionary.
  fn commit_version(
    &self,
    commit: VersionCommit,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  // ── Codec state ───────────────────────────────────────────────────────

  fn dictionary(
    &self,
    dict_id: DictId,
  ) -> impl Future<Output = Result<Option<DictionaryRecord>, Self::Error>> + Send + '_;

  /// Return the stored pool partition, storing `candidate` first if none
  /// exists yet.
  fn init_pool_partition(
    &self,
    candidate: Vec<Vec<char>>,
  ) -> impl Future<Output = Result<Vec<Vec<char>>, Self::Error>> + Send + '_;
}
