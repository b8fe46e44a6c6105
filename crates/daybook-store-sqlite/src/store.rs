//! [`SqliteStore`], the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{ErrorCode, OptionalExtension as _};
use tracing::debug;
use uuid::Uuid;

use daybook_core::{
  history::CalcHistoryEntry,
  inputs::SourceEvent,
  node::{DailyNode, NodeStatus, SubjectId},
  store::{CommitOutcome, LedgerStore, VersionCommit},
  token::{DictId, DictionaryRecord},
};

use crate::{
  Result,
  encode::{
    NODE_COLUMNS, RawCalcHistory, RawDailyNode, encode_calc_payload, encode_date,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Daybook ledger store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn read_events(
    &self,
    table: &'static str,
    subject_id: SubjectId,
    date: NaiveDate,
  ) -> Result<Vec<SourceEvent>> {
    let date_str = encode_date(date);

    let events = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT event_type, payload FROM {table}
           WHERE subject_id = ?1 AND date = ?2
           ORDER BY id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_id.as_str(), date_str], |row| {
            Ok(SourceEvent { event_type: row.get(0)?, payload: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(events)
  }

  async fn append_event(
    &self,
    table: &'static str,
    subject_id: SubjectId,
    date: NaiveDate,
    event: SourceEvent,
  ) -> Result<()> {
    let date_str = encode_date(date);
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO {table} (subject_id, date, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"
          ),
          rusqlite::params![
            subject_id.as_str(),
            date_str,
            event.event_type,
            event.payload,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_nodes(
    &self,
    filter: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<DailyNode>> {
    let raws: Vec<RawDailyNode> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM daily_nodes {filter}"))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawDailyNode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDailyNode::into_node).collect()
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = crate::Error;

  // ── Inputs ────────────────────────────────────────────────────────────────

  async fn raw_events(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
  ) -> Result<Vec<SourceEvent>> {
    self.read_events("raw_attendance_events", subject_id, date).await
  }

  async fn override_events(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
  ) -> Result<Vec<SourceEvent>> {
    self.read_events("daily_node_events", subject_id, date).await
  }

  async fn base_category(
    &self,
    subject_id: SubjectId,
    month:      String,
  ) -> Result<Option<String>> {
    let code = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT base_category_code FROM subject_month_profiles
             WHERE subject_id = ?1 AND month = ?2",
            rusqlite::params![subject_id.as_str(), month],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(code)
  }

  async fn append_raw_event(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
    event:      SourceEvent,
  ) -> Result<()> {
    self
      .append_event("raw_attendance_events", subject_id, date, event)
      .await
  }

  async fn append_override_event(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
    event:      SourceEvent,
  ) -> Result<()> {
    self
      .append_event("daily_node_events", subject_id, date, event)
      .await
  }

  async fn set_base_category(
    &self,
    subject_id: SubjectId,
    month:      String,
    code:       String,
  ) -> Result<()> {
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subject_month_profiles
             (subject_id, month, base_category_code, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (subject_id, month) DO UPDATE SET
             base_category_code = excluded.base_category_code,
             updated_at         = excluded.updated_at",
          rusqlite::params![subject_id.as_str(), month, code, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Nodes ─────────────────────────────────────────────────────────────────

  async fn active_node(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
  ) -> Result<Option<DailyNode>> {
    let mut nodes = self
      .query_nodes(
        "WHERE subject_id = ?1 AND date = ?2 AND status = 'ACTIVE'",
        vec![subject_id.as_str().to_owned(), encode_date(date)],
      )
      .await?;
    Ok(nodes.pop())
  }

  async fn node_history(
    &self,
    subject_id: SubjectId,
    date:       NaiveDate,
  ) -> Result<Vec<DailyNode>> {
    self
      .query_nodes(
        "WHERE subject_id = ?1 AND date = ?2 ORDER BY version DESC",
        vec![subject_id.as_str().to_owned(), encode_date(date)],
      )
      .await
  }

  async fn node(&self, id: Uuid) -> Result<Option<DailyNode>> {
    let mut nodes = self
      .query_nodes("WHERE id = ?1", vec![encode_uuid(id)])
      .await?;
    Ok(nodes.pop())
  }

  async fn calc_history(&self, node_id: Uuid) -> Result<Vec<CalcHistoryEntry>> {
    let id_str = encode_uuid(node_id);

    let raws: Vec<RawCalcHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, daily_node_id, payload, recorded_at
           FROM calc_history
           WHERE daily_node_id = ?1
           ORDER BY entry_id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawCalcHistory {
              entry_id:      row.get(0)?,
              daily_node_id: row.get(1)?,
              payload:       row.get(2)?,
              recorded_at:   row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCalcHistory::into_entry).collect()
  }

  async fn commit_version(&self, commit: VersionCommit) -> Result<CommitOutcome> {
    let VersionCommit { retiring, node, history, dictionary } = commit;

    let node_id_str     = encode_uuid(node.id);
    let retiring_str    = retiring.map(encode_uuid);
    let valid_from_str  = encode_dt(node.valid_from);
    let payload_str     = encode_calc_payload(&history)?;
    let mapping_str     = serde_json::to_string(&dictionary.dictionary)?;
    let dict_id_str     = dictionary.dict_id.as_str().to_owned();
    let subject_id_str  = node.subject_id.as_str().to_owned();
    let date_str        = encode_date(node.date);
    let statement_str   = encode_uuid(node.statement_id);
    let supersedes_str  = node.supersedes_id.map(encode_uuid);
    let status_str      = NodeStatus::Active.as_str();
    let node_dict_str   = node.dict_id.as_str().to_owned();
    let inputs_hash_str = node.inputs_hash.as_str().to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(old_id) = &retiring_str {
          let retired = tx.execute(
            "UPDATE daily_nodes
             SET status = 'SUPERSEDED', valid_to = ?1, superseded_by_id = ?2
             WHERE id = ?3 AND status = 'ACTIVE'",
            rusqlite::params![valid_from_str, node_id_str, old_id],
          )?;
          if retired == 0 {
            // Someone else retired it first; dropping `tx` rolls back.
            return Ok(CommitOutcome::Conflict);
          }
        }

        tx.execute(
          "INSERT INTO dictionaries (dict_id, mapping, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![dict_id_str, mapping_str, valid_from_str],
        )?;

        let inserted = tx.execute(
          "INSERT INTO daily_nodes (
             id, subject_id, date, version, status, valid_from, valid_to,
             supersedes_id, superseded_by_id, change_reason_code, change_note,
             statement_id, inputs_hash, derived_category_code, raw_minutes,
             ext_minutes, state_token, dict_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, NULL, ?8, ?9,
                     ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
          rusqlite::params![
            node_id_str,
            subject_id_str,
            date_str,
            node.version,
            status_str,
            valid_from_str,
            supersedes_str,
            node.change_reason_code,
            node.change_note,
            statement_str,
            inputs_hash_str,
            node.derived_category_code,
            node.raw_minutes,
            node.ext_minutes,
            node.state_token,
            node_dict_str,
          ],
        );
        match inserted {
          Err(e) if is_constraint_violation(&e) => return Ok(CommitOutcome::Conflict),
          other => {
            other?;
          }
        }

        tx.execute(
          "INSERT INTO calc_history (daily_node_id, payload, recorded_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![node_id_str, payload_str, valid_from_str],
        )?;

        tx.commit()?;
        Ok(CommitOutcome::Committed)
      })
      .await?;

    debug!(?outcome, "commit_version");
    Ok(outcome)
  }

  // ── Codec state ───────────────────────────────────────────────────────────

  async fn dictionary(&self, dict_id: DictId) -> Result<Option<DictionaryRecord>> {
    let id_str = dict_id.as_str().to_owned();

    let mapping: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT mapping FROM dictionaries WHERE dict_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    mapping
      .map(|m| -> Result<DictionaryRecord> {
        Ok(DictionaryRecord {
          dict_id:    dict_id.clone(),
          dictionary: serde_json::from_str(&m)?,
        })
      })
      .transpose()
  }

  async fn init_pool_partition(
    &self,
    candidate: Vec<Vec<char>>,
  ) -> Result<Vec<Vec<char>>> {
    let candidate_str = serde_json::to_string(&candidate)?;
    let at_str        = encode_dt(Utc::now());

    let stored: String = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO codec_pools (slot, partition, created_at)
           VALUES (0, ?1, ?2)",
          rusqlite::params![candidate_str, at_str],
        )?;
        Ok(conn.query_row(
          "SELECT partition FROM codec_pools WHERE slot = 0",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(serde_json::from_str(&stored)?)
  }
}
