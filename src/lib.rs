#![deny(missing_docs)]
//! # JHelp
//!
//! A three-tier glossary: front-ends talk to a relay server, which funnels
//! every request onto one connection to the persistence tier, which keeps
//! terms and their definitions in SQLite.
//!
//! ## Example Usage
//!
//! ```rust
//! use jhelp::{GlossaryEngine, Request, SqliteEngine};
//!
//! let engine = SqliteEngine::open_in_memory().unwrap();
//! let response = engine.execute(Request::insert("foo", "bar")).unwrap();
//! assert_eq!(response.key.id, Some(1));
//! assert_eq!(response.values[0].text, "bar");
//! ```
pub mod client;

pub mod config;

pub mod db_server;

pub mod engine;

pub mod error;

pub mod frame;

pub mod listener;

pub mod protocol;

pub mod relay;

mod glossary_db;

pub use crate::client::GlossaryClient;
pub use crate::db_server::DbServer;
pub use crate::engine::{GlossaryEngine, SqliteEngine};
pub use crate::error::{JHelpError, Result};
pub use crate::listener::ShutdownHandle;
pub use crate::protocol::{Entry, EntryState, Operation, Request};
pub use crate::relay::{Downstream, RelayServer};
