//! Core types, codecs and the versioning engine for the Daybook ledger.
//!
//! No database or CLI dependencies live here. Storage backends implement
//! [`store::LedgerStore`]; the engine in [`ledger`] is generic over it.

pub mod access;
pub mod canonical;
pub mod derive;
pub mod error;
pub mod export;
pub mod history;
pub mod inputs;
pub mod ledger;
pub mod node;
pub mod node_key;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerSettings};
