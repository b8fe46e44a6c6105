//! Subcommands and their handlers.

use anyhow::{Context as _, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use daybook_core::{
  Ledger,
  inputs::SourceEvent,
  node::SubjectId,
  store::LedgerStore as _,
};
use daybook_store_sqlite::SqliteStore;
use serde::Serialize;
use uuid::Uuid;

use crate::config::LedgerConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Append a raw attendance event.
  IngestRaw(EventArgs),
  /// Append a daily override event.
  IngestOverride(EventArgs),
  /// Set a subject's base category for a month.
  SetBase {
    #[arg(long)]
    subject: String,
    /// `YYYY-MM`.
    #[arg(long)]
    month:   String,
    #[arg(long)]
    code:    String,
  },
  /// Recompute the node for a day.
  Rebuild {
    #[command(flatten)]
    day:    DayArgs,
    #[arg(long, default_value = "MANUAL")]
    reason: String,
    #[arg(long)]
    note:   Option<String>,
  },
  /// Print the active node for a day.
  Active(DayArgs),
  /// Print every version for a day, newest first.
  History(DayArgs),
  /// Print the calc history of one node.
  Audit {
    #[arg(long)]
    node: Uuid,
  },
  /// Print an export of the day's current events.
  Export(DayArgs),
  /// Decode the active node's state token.
  Decode {
    #[command(flatten)]
    day:     DayArgs,
    #[arg(long)]
    dict_id: Option<String>,
    /// Caller zone, checked against `trusted_zones`.
    #[arg(long, default_value = "")]
    zone:    String,
  },
}

#[derive(Args, Debug)]
pub struct DayArgs {
  #[arg(long)]
  subject: String,
  /// `YYYY-MM-DD`.
  #[arg(long)]
  date:    NaiveDate,
}

impl DayArgs {
  fn subject_id(&self) -> SubjectId { SubjectId::new(self.subject.as_str()) }
}

#[derive(Args, Debug)]
pub struct EventArgs {
  #[command(flatten)]
  day:        DayArgs,
  #[arg(long = "type")]
  event_type: String,
  /// Raw payload text, normally a JSON object.
  #[arg(long)]
  payload:    Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

pub async fn run(
  command: Command,
  ledger: &Ledger<SqliteStore>,
  cfg: &LedgerConfig,
) -> anyhow::Result<()> {
  let store = ledger.store();

  match command {
    Command::IngestRaw(args) => {
      let subject = args.day.subject_id();
      store
        .append_raw_event(
          subject.clone(),
          args.day.date,
          SourceEvent::new(args.event_type, args.payload),
        )
        .await
        .context("failed to record raw event")?;
      tracing::info!(%subject, date = %args.day.date, "raw event recorded");
    }

    Command::IngestOverride(args) => {
      let subject = args.day.subject_id();
      store
        .append_override_event(
          subject.clone(),
          args.day.date,
          SourceEvent::new(args.event_type, args.payload),
        )
        .await
        .context("failed to record override event")?;
      tracing::info!(%subject, date = %args.day.date, "override event recorded");
    }

    Command::SetBase { subject, month, code } => {
      if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
        bail!("month must be YYYY-MM, got {month:?}");
      }
      store
        .set_base_category(SubjectId::new(subject), month, code)
        .await
        .context("failed to set base category")?;
    }

    Command::Rebuild { day, reason, note } => {
      let outcome = ledger
        .rebuild(&day.subject_id(), day.date, &reason, note.as_deref())
        .await
        .context("rebuild failed")?;
      print_json(&outcome)?;
    }

    Command::Active(day) => {
      print_json(&ledger.get_active(&day.subject_id(), day.date).await?)?;
    }

    Command::History(day) => {
      print_json(&ledger.get_history(&day.subject_id(), day.date).await?)?;
    }

    Command::Audit { node } => {
      print_json(&ledger.calc_history(node).await?)?;
    }

    Command::Export(day) => {
      let secret = cfg
        .node_secret
        .as_ref()
        .context("node_secret is not configured")?;
      let export = ledger
        .export_day(secret, &day.subject_id(), day.date)
        .await
        .context("export failed")?;
      print_json(&export)?;
    }

    Command::Decode { day, dict_id, zone } => {
      let decoded = ledger
        .decode_active(
          &day.subject_id(),
          day.date,
          dict_id.as_deref(),
          cfg.is_trusted_zone(&zone),
        )
        .await
        .context("decode refused")?;
      print_json(&decoded)?;
    }
  }

  Ok(())
}
