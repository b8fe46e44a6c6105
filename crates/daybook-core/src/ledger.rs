//! The daily node versioning engine.
//!
//! [`Ledger::rebuild`] reads the active node, then collects and hashes the
//! inputs, compares and commits. Unchanged inputs are a no-op; changed inputs
//! supersede the active version. The
//! read-compare-write cycle is linearised by the backend: a commit that loses
//! a race comes back as [`CommitOutcome::Conflict`] and the whole cycle is
//! retried against the now-current active node.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{NodeAccessBlocked, enforce_node_access},
  canonical::InputsHash,
  derive::derive,
  export::{NodeExport, build_node},
  history::{CalcHistoryEntry, CalcPayload},
  inputs::{DailyInputs, month_key},
  node::{DailyNode, NodeStatus, RebuildAction, RebuildOutcome, SubjectId},
  node_key::NodeSecret,
  store::{CommitOutcome, LedgerStore, VersionCommit},
  token::{DEFAULT_TOKEN_LENGTH, DecodedState, DictId, DictionaryRecord, TokenCodec},
};

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LedgerSettings {
  /// Characters per state token.
  pub token_length:         usize,
  /// How many read-compare-write cycles a rebuild may run before giving up
  /// on concurrent writers.
  pub max_rebuild_attempts: u32,
}

impl Default for LedgerSettings {
  fn default() -> Self {
    Self { token_length: DEFAULT_TOKEN_LENGTH, max_rebuild_attempts: 3 }
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// The versioning engine over a [`LedgerStore`].
pub struct Ledger<S> {
  store:    Arc<S>,
  codec:    Arc<TokenCodec>,
  settings: LedgerSettings,
}

impl<S> Clone for Ledger<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      codec:    Arc::clone(&self.codec),
      settings: self.settings.clone(),
    }
  }
}

impl<S: LedgerStore> Ledger<S> {
  pub fn new(store: Arc<S>, codec: Arc<TokenCodec>, settings: LedgerSettings) -> Self {
    Self { store, codec, settings }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn codec(&self) -> &TokenCodec { &self.codec }

  pub fn settings(&self) -> &LedgerSettings { &self.settings }

  /// Read everything a rebuild of (subject, date) depends on.
  pub async fn collect_inputs(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
  ) -> Result<DailyInputs> {
    let raw = self
      .store
      .raw_events(subject_id.clone(), date)
      .await
      .map_err(Error::store)?;
    let base = self
      .store
      .base_category(subject_id.clone(), month_key(date))
      .await
      .map_err(Error::store)?;
    let overrides = self
      .store
      .override_events(subject_id.clone(), date)
      .await
      .map_err(Error::store)?;
    Ok(DailyInputs::new(raw, base, overrides))
  }

  /// Recompute the node for (subject, date).
  pub async fn rebuild(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
    change_reason_code: &str,
    change_note: Option<&str>,
  ) -> Result<RebuildOutcome> {
    let attempts = self.settings.max_rebuild_attempts.max(1);

    for attempt in 1..=attempts {
      // Active node before inputs: a version committed in between makes our
      // commit conflict instead of superseding it with older inputs.
      let existing = self
        .store
        .active_node(subject_id.clone(), date)
        .await
        .map_err(Error::store)?;

      let inputs = self.collect_inputs(subject_id, date).await?;
      let inputs_hash = InputsHash::of_inputs(&inputs);

      if let Some(node) = existing.as_ref().filter(|n| n.inputs_hash == inputs_hash) {
        debug!(%subject_id, %date, version = node.version, "inputs unchanged");
        return Ok(RebuildOutcome { action: RebuildAction::Noop, node: node.clone() });
      }

      let derived = derive(&inputs);
      let (dictionary, state_token) = self
        .codec
        .issue(&inputs.event_records(), self.settings.token_length);

      let node = DailyNode {
        id: Uuid::new_v4(),
        subject_id: subject_id.clone(),
        date,
        version: existing.as_ref().map_or(1, |n| n.version + 1),
        status: NodeStatus::Active,
        valid_from: Utc::now(),
        valid_to: None,
        supersedes_id: existing.as_ref().map(|n| n.id),
        superseded_by_id: None,
        statement_id: existing.as_ref().map_or_else(Uuid::new_v4, |n| n.statement_id),
        change_reason_code: change_reason_code.to_owned(),
        change_note: change_note.map(str::to_owned),
        inputs_hash: inputs_hash.clone(),
        derived_category_code: derived.derived_category_code.clone(),
        raw_minutes: derived.raw_minutes,
        ext_minutes: derived.ext_minutes,
        state_token,
        dict_id: dictionary.dict_id.clone(),
      };

      let commit = VersionCommit {
        retiring:   node.supersedes_id,
        node:       node.clone(),
        history:    CalcPayload::new(inputs_hash, &derived, &inputs.policy_version),
        dictionary: (*dictionary).clone(),
      };

      let outcome = match self.store.commit_version(commit).await {
        Ok(outcome) => outcome,
        Err(err) => {
          self.codec.registry().remove(&dictionary.dict_id);
          return Err(Error::store(err));
        }
      };

      match outcome {
        CommitOutcome::Committed => {
          let action = if existing.is_some() {
            RebuildAction::Superseded
          } else {
            RebuildAction::Created
          };
          info!(
            %subject_id,
            %date,
            version = node.version,
            ?action,
            reason = change_reason_code,
            "daily node rebuilt"
          );
          return Ok(RebuildOutcome { action, node });
        }
        CommitOutcome::Conflict => {
          self.codec.registry().remove(&dictionary.dict_id);
          warn!(%subject_id, %date, attempt, "concurrent rebuild, retrying");
        }
      }
    }

    Err(Error::VersionConflict { attempts })
  }

  pub async fn get_active(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
  ) -> Result<Option<DailyNode>> {
    self
      .store
      .active_node(subject_id.clone(), date)
      .await
      .map_err(Error::store)
  }

  /// All versions for (subject, date), newest first.
  pub async fn get_history(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
  ) -> Result<Vec<DailyNode>> {
    self
      .store
      .node_history(subject_id.clone(), date)
      .await
      .map_err(Error::store)
  }

  pub async fn calc_history(&self, node_id: Uuid) -> Result<Vec<CalcHistoryEntry>> {
    self.store.calc_history(node_id).await.map_err(Error::store)
  }

  /// Walk `supersedes_id` back from the active node. Newest first; empty if
  /// there is no active node.
  pub async fn lineage(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
  ) -> Result<Vec<DailyNode>> {
    let mut chain = Vec::new();
    let mut cursor = self.get_active(subject_id, date).await?;
    while let Some(node) = cursor {
      cursor = match node.supersedes_id {
        Some(prev) => Some(
          self
            .store
            .node(prev)
            .await
            .map_err(Error::store)?
            .ok_or(Error::NodeNotFound(prev))?,
        ),
        None => None,
      };
      chain.push(node);
    }
    Ok(chain)
  }

  /// Look a dictionary up in the registry, falling back to the store and
  /// caching what it finds.
  pub async fn resolve_dictionary(
    &self,
    dict_id: &str,
  ) -> Result<Option<Arc<DictionaryRecord>>> {
    if let Some(record) = self.codec.registry().get(dict_id) {
      return Ok(Some(record));
    }
    let stored = self
      .store
      .dictionary(DictId::from(dict_id))
      .await
      .map_err(Error::store)?;
    Ok(stored.map(|record| {
      debug!(dict_id, "dictionary rehydrated from store");
      self.codec.registry().insert(record)
    }))
  }

  /// Decode `node`'s token for a caller presenting `dict_id`.
  ///
  /// The access gate runs before any decoding.
  pub async fn decode_node(
    &self,
    node: &DailyNode,
    dict_id: Option<&str>,
    allowed_zone: bool,
  ) -> Result<DecodedState> {
    if let Some(id) = dict_id.filter(|id| !id.is_empty()) {
      self.resolve_dictionary(id).await?;
    }
    enforce_node_access(dict_id, allowed_zone, self.codec.registry())?;
    if dict_id != Some(node.dict_id.as_str()) {
      return Err(NodeAccessBlocked::DictionaryMismatch.into());
    }
    let record = self
      .codec
      .registry()
      .get(node.dict_id.as_str())
      .ok_or(NodeAccessBlocked::UnknownDictionary)?;
    self.codec.decode(&node.state_token, &record)
  }

  /// [`Self::decode_node`] on the active node of (subject, date).
  pub async fn decode_active(
    &self,
    subject_id: &SubjectId,
    date: NaiveDate,
    dict_id: Option<&str>,
    allowed_zone: bool,
  ) -> Result<DecodedState> {
    let node = self.get_active(subject_id, date).await?.ok_or_else(|| {
      Error::NoActiveNode { subject_id: subject_id.to_string(), date }
    })?;
    self.decode_node(&node, dict_id, allowed_zone).await
  }

  /// Export the day's current events for an external caller.
  pub async fn export_day(
    &self,
    secret: &NodeSecret,
    subject_id: &SubjectId,
    date: NaiveDate,
  ) -> Result<NodeExport> {
    let inputs = self.collect_inputs(subject_id, date).await?;
    Ok(build_node(
      secret,
      subject_id,
      date,
      &inputs.event_records(),
      self.codec.registry(),
      self.codec.pools(),
      self.settings.token_length,
    ))
  }
}
