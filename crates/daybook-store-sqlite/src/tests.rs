//! Integration tests for `SqliteStore` and the ledger engine running on it.

use std::{
  future::Future,
  pin::Pin,
  sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
  },
};

use chrono::NaiveDate;
use daybook_core::{
  Error, Ledger, LedgerSettings,
  access::NodeAccessBlocked,
  inputs::{SourceEvent, month_key},
  node::{NodeStatus, RebuildAction, SubjectId},
  node_key::NodeSecret,
  history::CalcHistoryEntry,
  node::DailyNode,
  store::{CommitOutcome, LedgerStore, VersionCommit},
  token::{DictId, DictionaryRecord, TokenCodec, UnicodePools},
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ledger_on(store: &SqliteStore, codec: TokenCodec) -> Ledger<SqliteStore> {
  Ledger::new(
    Arc::new(store.clone()),
    Arc::new(codec),
    LedgerSettings::default(),
  )
}

async fn ledger() -> Ledger<SqliteStore> { ledger_on(&store().await, TokenCodec::new()) }

fn subject() -> SubjectId { SubjectId::new("c1") }

fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() }

async fn add_raw(l: &Ledger<SqliteStore>, minutes: i64) {
  l.store()
    .append_raw_event(
      subject(),
      day(),
      SourceEvent::with_json("check_in", &json!({ "minutes": minutes })),
    )
    .await
    .unwrap();
}

async fn add_override(l: &Ledger<SqliteStore>, payload: serde_json::Value) {
  l.store()
    .append_override_event(subject(), day(), SourceEvent::with_json("override", &payload))
    .await
    .unwrap();
}

async fn set_base(l: &Ledger<SqliteStore>, code: &str) {
  l.store()
    .set_base_category(subject(), month_key(day()), code.to_owned())
    .await
    .unwrap();
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn events_come_back_in_arrival_order() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  add_raw(&l, 15).await;
  add_raw(&l, 5).await;

  let events = l.store().raw_events(subject(), day()).await.unwrap();
  let minutes: Vec<_> = events
    .iter()
    .map(|e| e.parsed_payload()["minutes"].as_i64().unwrap())
    .collect();
  assert_eq!(minutes, vec![30, 15, 5]);
}

#[tokio::test]
async fn events_are_scoped_to_subject_and_date() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  let other_day = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();

  assert!(l.store().raw_events(subject(), other_day).await.unwrap().is_empty());
  assert!(
    l.store()
      .raw_events(SubjectId::new("c2"), day())
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn set_base_category_replaces_previous_value() {
  let l = ledger().await;
  set_base(&l, "NORMAL").await;
  set_base(&l, "REMOTE").await;

  let base = l.store().base_category(subject(), "2024-04".into()).await.unwrap();
  assert_eq!(base.as_deref(), Some("REMOTE"));
  let other = l.store().base_category(subject(), "2024-05".into()).await.unwrap();
  assert!(other.is_none());
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_rebuild_creates_then_override_supersedes() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  add_raw(&l, 15).await;
  set_base(&l, "NORMAL").await;

  let first = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();
  assert_eq!(first.action, RebuildAction::Created);
  assert_eq!(first.node.version, 1);
  assert_eq!(first.node.raw_minutes, 45);
  assert_eq!(first.node.ext_minutes, 0);
  assert_eq!(first.node.derived_category_code.as_deref(), Some("NORMAL"));
  assert!(first.node.supersedes_id.is_none());

  add_override(&l, json!({ "ext_minutes": "10" })).await;
  let second = l
    .rebuild(&subject(), day(), "MANUAL_EDIT", Some("ext time"))
    .await
    .unwrap();
  assert_eq!(second.action, RebuildAction::Superseded);
  assert_eq!(second.node.version, 2);
  assert_eq!(second.node.ext_minutes, 10);
  assert_eq!(second.node.raw_minutes, 45);
  assert_eq!(second.node.supersedes_id, Some(first.node.id));
  assert_eq!(second.node.change_note.as_deref(), Some("ext time"));

  let old = l.store().node(first.node.id).await.unwrap().unwrap();
  assert_eq!(old.status, NodeStatus::Superseded);
  assert_eq!(old.superseded_by_id, Some(second.node.id));
  assert_eq!(old.valid_to, Some(second.node.valid_from));

  let active = l.get_active(&subject(), day()).await.unwrap().unwrap();
  assert_eq!(active.id, second.node.id);
}

#[tokio::test]
async fn rebuild_with_unchanged_inputs_is_noop() {
  let l = ledger().await;
  add_raw(&l, 30).await;

  let first = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();
  let again = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();

  assert_eq!(again.action, RebuildAction::Noop);
  assert_eq!(again.node.id, first.node.id);
  assert_eq!(l.get_history(&subject(), day()).await.unwrap().len(), 1);
  assert_eq!(l.calc_history(first.node.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rebuild_of_empty_day_creates_zero_node() {
  let l = ledger().await;
  let out = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();

  assert_eq!(out.action, RebuildAction::Created);
  assert_eq!(out.node.raw_minutes, 0);
  assert_eq!(out.node.ext_minutes, 0);
  assert!(out.node.derived_category_code.is_none());
  assert_eq!(out.node.state_token.chars().count(), 64);
}

#[tokio::test]
async fn malformed_payloads_do_not_fail_rebuild() {
  let l = ledger().await;
  l.store()
    .append_raw_event(subject(), day(), SourceEvent::new("check_in", Some("{not json".into())))
    .await
    .unwrap();
  l.store()
    .append_raw_event(subject(), day(), SourceEvent::new("check_in", None))
    .await
    .unwrap();
  add_raw(&l, 20).await;

  let out = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();
  assert_eq!(out.node.raw_minutes, 20);
}

#[tokio::test]
async fn versions_are_monotonic_with_one_active_row() {
  let l = ledger().await;
  for minutes in 1..=4 {
    add_raw(&l, minutes).await;
    l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();
  }

  let history = l.get_history(&subject(), day()).await.unwrap();
  let versions: Vec<_> = history.iter().map(|n| n.version).collect();
  assert_eq!(versions, vec![4, 3, 2, 1]);
  assert_eq!(history.iter().filter(|n| n.is_active()).count(), 1);
  assert!(history[0].is_active());
}

#[tokio::test]
async fn lineage_walks_back_and_statement_id_is_stable() {
  let l = ledger().await;
  for minutes in [10, 20, 30] {
    add_raw(&l, minutes).await;
    l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();
  }

  let chain = l.lineage(&subject(), day()).await.unwrap();
  assert_eq!(chain.len(), 3);
  assert_eq!(chain.iter().map(|n| n.version).collect::<Vec<_>>(), vec![3, 2, 1]);
  for pair in chain.windows(2) {
    assert_eq!(pair[0].supersedes_id, Some(pair[1].id));
    assert_eq!(pair[1].superseded_by_id, Some(pair[0].id));
  }
  assert!(chain.iter().all(|n| n.statement_id == chain[0].statement_id));
}

#[tokio::test]
async fn lineage_of_missing_day_is_empty() {
  let l = ledger().await;
  assert!(l.lineage(&subject(), day()).await.unwrap().is_empty());
}

#[tokio::test]
async fn calc_history_records_each_version() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  set_base(&l, "NORMAL").await;
  let out = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();

  let entries = l.calc_history(out.node.id).await.unwrap();
  assert_eq!(entries.len(), 1);
  let payload = &entries[0].payload;
  assert_eq!(entries[0].daily_node_id, out.node.id);
  assert_eq!(payload.inputs_hash, out.node.inputs_hash);
  assert_eq!(payload.raw_minutes, 30);
  assert_eq!(payload.ext_minutes, 0);
  assert_eq!(payload.derived_category_code.as_deref(), Some("NORMAL"));
  assert_eq!(payload.policy_version, "v1");
}

#[tokio::test]
async fn equal_inputs_give_equal_digits_across_dictionaries() {
  let a = ledger().await;
  let b = ledger().await;
  for l in [&a, &b] {
    add_raw(l, 30).await;
    add_raw(l, 15).await;
  }

  let na = a.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  let nb = b.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  assert_eq!(na.inputs_hash, nb.inputs_hash);
  assert_ne!(na.dict_id, nb.dict_id);

  let da = a.decode_node(&na, Some(na.dict_id.as_str()), true).await.unwrap();
  let db = b.decode_node(&nb, Some(nb.dict_id.as_str()), true).await.unwrap();
  assert_eq!(da.digits, db.digits);
}

#[tokio::test]
async fn concurrent_rebuilds_leave_one_version() {
  let l = ledger().await;
  add_raw(&l, 30).await;

  let sid = subject();
  let (x, y) = tokio::join!(
    l.rebuild(&sid, day(), "INGEST", None),
    l.rebuild(&sid, day(), "INGEST", None),
  );
  let mut actions = vec![x.unwrap().action, y.unwrap().action];
  actions.sort_by_key(|a| *a as u8);
  assert_eq!(actions, vec![RebuildAction::Created, RebuildAction::Noop]);

  let history = l.get_history(&subject(), day()).await.unwrap();
  assert_eq!(history.len(), 1);
}

// ─── Commit guards ───────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_against_retired_node_conflicts() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  let v1 = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  add_raw(&l, 15).await;
  let v2 = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;

  let mut stale = v2.clone();
  stale.id = Uuid::new_v4();
  stale.version = 2;
  stale.supersedes_id = Some(v1.id);
  let dictionary = (*l.codec().registry().create()).clone();
  stale.dict_id = dictionary.dict_id.clone();

  let history = l.calc_history(v2.id).await.unwrap().remove(0).payload;
  let outcome = l
    .store()
    .commit_version(VersionCommit {
      retiring: Some(v1.id),
      node: stale,
      history,
      dictionary,
    })
    .await
    .unwrap();
  assert_eq!(outcome, CommitOutcome::Conflict);

  let active = l.get_active(&subject(), day()).await.unwrap().unwrap();
  assert_eq!(active.id, v2.id);
  assert_eq!(l.get_history(&subject(), day()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn second_version_one_conflicts() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  let v1 = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;

  let mut twin = v1.clone();
  twin.id = Uuid::new_v4();
  let dictionary = (*l.codec().registry().create()).clone();
  twin.dict_id = dictionary.dict_id.clone();
  let history = l.calc_history(v1.id).await.unwrap().remove(0).payload;

  let outcome = l
    .store()
    .commit_version(VersionCommit { retiring: None, node: twin, history, dictionary })
    .await
    .unwrap();
  assert_eq!(outcome, CommitOutcome::Conflict);
}

#[tokio::test]
async fn superseded_rows_and_history_are_immutable() {
  let s = store().await;
  let l = ledger_on(&s, TokenCodec::new());
  add_raw(&l, 30).await;
  let v1 = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  add_raw(&l, 15).await;
  l.rebuild(&subject(), day(), "INGEST", None).await.unwrap();

  let id = v1.id.hyphenated().to_string();
  let update = s
    .connection()
    .call(move |conn| {
      conn.execute("UPDATE daily_nodes SET raw_minutes = 0 WHERE id = ?1", [&id])?;
      Ok(())
    })
    .await;
  assert!(update.is_err());

  let delete = s
    .connection()
    .call(|conn| {
      conn.execute("DELETE FROM calc_history", [])?;
      Ok(())
    })
    .await;
  assert!(delete.is_err());

  let unchanged = s.node(v1.id).await.unwrap().unwrap();
  assert_eq!(unchanged.raw_minutes, 30);
}

// ─── Decoding ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn decode_active_through_the_gate() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  let node = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  let dict = node.dict_id.as_str();

  let decoded = l.decode_active(&subject(), day(), Some(dict), true).await.unwrap();
  assert_eq!(decoded.dict_id, node.dict_id);
  assert_eq!(decoded.digits.len(), 64);
  assert!(decoded.digits.iter().all(|d| *d < 10));

  let blocked = |r: daybook_core::Result<_>| match r {
    Err(Error::AccessBlocked(reason)) => reason,
    other => panic!("expected access block, got {other:?}"),
  };

  assert_eq!(
    blocked(l.decode_active(&subject(), day(), None, true).await),
    NodeAccessBlocked::MissingDictionary
  );
  assert_eq!(
    blocked(l.decode_active(&subject(), day(), Some("nope"), true).await),
    NodeAccessBlocked::UnknownDictionary
  );
  assert_eq!(
    blocked(l.decode_active(&subject(), day(), Some(dict), false).await),
    NodeAccessBlocked::OutsideZone
  );

  let foreign = l.codec().registry().create();
  assert_eq!(
    blocked(
      l.decode_active(&subject(), day(), Some(foreign.dict_id.as_str()), true)
        .await
    ),
    NodeAccessBlocked::DictionaryMismatch
  );
}

#[tokio::test]
async fn decode_without_active_node_fails() {
  let l = ledger().await;
  let err = l.decode_active(&subject(), day(), Some("x"), true).await.unwrap_err();
  assert!(matches!(err, Error::NoActiveNode { .. }));
}

#[tokio::test]
async fn decode_after_restart_rehydrates_codec_state() {
  let s = store().await;
  let partition = s
    .init_pool_partition(UnicodePools::default().partition())
    .await
    .unwrap();
  let first = ledger_on(
    &s,
    TokenCodec::with_pools(UnicodePools::from_partition(partition.clone()).unwrap()),
  );
  add_raw(&first, 30).await;
  let node = first.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;
  let expected = first
    .decode_node(&node, Some(node.dict_id.as_str()), true)
    .await
    .unwrap();

  // A fresh process: same file, empty registry.
  let reopened = s
    .init_pool_partition(UnicodePools::default().partition())
    .await
    .unwrap();
  assert_eq!(reopened, partition);
  let second = ledger_on(
    &s,
    TokenCodec::with_pools(UnicodePools::from_partition(reopened).unwrap()),
  );
  assert!(second.codec().registry().is_empty());

  let decoded = second
    .decode_node(&node, Some(node.dict_id.as_str()), true)
    .await
    .unwrap();
  assert_eq!(decoded, expected);
  assert!(second.codec().registry().contains(node.dict_id.as_str()));
}

#[tokio::test]
async fn dictionary_lookup_round_trips() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  let node = l.rebuild(&subject(), day(), "INGEST", None).await.unwrap().node;

  let stored = l.store().dictionary(node.dict_id.clone()).await.unwrap().unwrap();
  let cached = l.codec().registry().get(node.dict_id.as_str()).unwrap();
  assert_eq!(stored, *cached);

  let missing = l.store().dictionary("absent".into()).await.unwrap();
  assert!(missing.is_none());
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_day_carries_current_events() {
  let l = ledger().await;
  add_raw(&l, 30).await;
  add_override(&l, json!({ "derived_category_code": "LATE" })).await;

  let secret = NodeSecret::new("s3cret");
  let export = l.export_day(&secret, &subject(), day()).await.unwrap();
  assert_eq!(export.v, 1);
  assert_eq!(export.date, "20240401");
  assert_eq!(export.prefix12.len(), 12);
  assert_eq!(export.events.len(), 2);
  assert_eq!(export.state_token.chars().count(), 64);
  assert!(l.codec().registry().contains(export.dict_id.as_str()));

  let again = l.export_day(&secret, &subject(), day()).await.unwrap();
  assert_eq!(again.node_key, export.node_key);
  assert_ne!(again.dict_id, export.dict_id);
}

// ─── Scripted store ──────────────────────────────────────────────────────────

type Hook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitMode {
  Pass,
  Conflict,
  Fail,
}

/// Delegates to a `SqliteStore`, running a one-shot hook before the first
/// active-node read and answering commits according to `commit_mode`.
struct ScriptedStore {
  inner:         SqliteStore,
  before_active: Mutex<Option<Hook>>,
  commit_mode:   CommitMode,
  commits:       AtomicU32,
}

fn scripted(
  store: &SqliteStore,
  commit_mode: CommitMode,
  hook: Option<Hook>,
) -> Ledger<ScriptedStore> {
  Ledger::new(
    Arc::new(ScriptedStore {
      inner: store.clone(),
      before_active: Mutex::new(hook),
      commit_mode,
      commits: AtomicU32::new(0),
    }),
    Arc::new(TokenCodec::new()),
    LedgerSettings::default(),
  )
}

impl LedgerStore for ScriptedStore {
  type Error = crate::Error;

  async fn raw_events(&self, s: SubjectId, d: NaiveDate) -> crate::Result<Vec<SourceEvent>> {
    self.inner.raw_events(s, d).await
  }

  async fn override_events(
    &self,
    s: SubjectId,
    d: NaiveDate,
  ) -> crate::Result<Vec<SourceEvent>> {
    self.inner.override_events(s, d).await
  }

  async fn base_category(&self, s: SubjectId, month: String) -> crate::Result<Option<String>> {
    self.inner.base_category(s, month).await
  }

  async fn append_raw_event(
    &self,
    s: SubjectId,
    d: NaiveDate,
    event: SourceEvent,
  ) -> crate::Result<()> {
    self.inner.append_raw_event(s, d, event).await
  }

  async fn append_override_event(
    &self,
    s: SubjectId,
    d: NaiveDate,
    event: SourceEvent,
  ) -> crate::Result<()> {
    self.inner.append_override_event(s, d, event).await
  }

  async fn set_base_category(
    &self,
    s: SubjectId,
    month: String,
    code: String,
  ) -> crate::Result<()> {
    self.inner.set_base_category(s, month, code).await
  }

  async fn active_node(&self, s: SubjectId, d: NaiveDate) -> crate::Result<Option<DailyNode>> {
    let hook = self.before_active.lock().unwrap().take();
    if let Some(hook) = hook {
      hook.await;
    }
    self.inner.active_node(s, d).await
  }

  async fn node_history(&self, s: SubjectId, d: NaiveDate) -> crate::Result<Vec<DailyNode>> {
    self.inner.node_history(s, d).await
  }

  async fn node(&self, id: Uuid) -> crate::Result<Option<DailyNode>> {
    self.inner.node(id).await
  }

  async fn calc_history(&self, id: Uuid) -> crate::Result<Vec<CalcHistoryEntry>> {
    self.inner.calc_history(id).await
  }

  async fn commit_version(&self, commit: VersionCommit) -> crate::Result<CommitOutcome> {
    self.commits.fetch_add(1, Ordering::SeqCst);
    match self.commit_mode {
      CommitMode::Pass => self.inner.commit_version(commit).await,
      CommitMode::Conflict => Ok(CommitOutcome::Conflict),
      CommitMode::Fail => Err(crate::Error::Decode {
        column: "daily_nodes",
        value:  "scripted failure".into(),
      }),
    }
  }

  async fn dictionary(&self, id: DictId) -> crate::Result<Option<DictionaryRecord>> {
    self.inner.dictionary(id).await
  }

  async fn init_pool_partition(
    &self,
    candidate: Vec<Vec<char>>,
  ) -> crate::Result<Vec<Vec<char>>> {
    self.inner.init_pool_partition(candidate).await
  }
}

// ─── Engine edge cases ───────────────────────────────────────────────────────

#[tokio::test]
async fn rebuild_never_supersedes_a_newer_version_with_older_inputs() {
  let s = store().await;
  let other = ledger_on(&s, TokenCodec::new());
  add_raw(&other, 30).await;

  // Another writer adds an event and commits just before our first read.
  let hook: Hook = Box::pin(async move {
    add_raw(&other, 15).await;
    let sid = subject();
    let out = other.rebuild(&sid, day(), "INGEST", None).await.unwrap();
    assert_eq!(out.node.raw_minutes, 45);
  });
  let l = scripted(&s, CommitMode::Pass, Some(hook));

  let sid = subject();
  let out = l.rebuild(&sid, day(), "INGEST", None).await.unwrap();
  assert_eq!(out.action, RebuildAction::Noop);

  let active = l.get_active(&sid, day()).await.unwrap().unwrap();
  let expected = daybook_core::derive::derive(&l.collect_inputs(&sid, day()).await.unwrap());
  assert_eq!(active.raw_minutes, expected.raw_minutes);
  assert_eq!(active.raw_minutes, 45);
  assert_eq!(l.get_history(&sid, day()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rebuild_gives_up_after_repeated_conflicts() {
  let s = store().await;
  s.append_raw_event(
    subject(),
    day(),
    SourceEvent::with_json("check_in", &json!({ "minutes": 30 })),
  )
  .await
  .unwrap();
  let l = scripted(&s, CommitMode::Conflict, None);

  let sid = subject();
  let err = l.rebuild(&sid, day(), "INGEST", None).await.unwrap_err();
  assert!(matches!(err, Error::VersionConflict { attempts: 3 }));
  assert_eq!(l.store().commits.load(Ordering::SeqCst), 3);
  assert!(l.codec().registry().is_empty());
  assert!(l.get_active(&sid, day()).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_commit_drops_the_issued_dictionary() {
  let s = store().await;
  let l = scripted(&s, CommitMode::Fail, None);

  let sid = subject();
  let err = l.rebuild(&sid, day(), "INGEST", None).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
  assert_eq!(l.store().commits.load(Ordering::SeqCst), 1);
  assert!(l.codec().registry().is_empty());
}
