//! SQLite backend for the Daybook ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Node rows and calc history are guarded
//! by triggers, so the append-only rules hold even against ad-hoc SQL.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
