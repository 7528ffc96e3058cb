//! The persistence engine.
//!
//! Turns a [`Request`] into storage reads and mutations and answers with the
//! state of the term after the operation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error};

use crate::error::{JHelpError, Result};
use crate::glossary_db::GlossaryDb;
use crate::protocol::{EntryState, Operation, Request};

/// A trait for glossary persistence engines.
pub trait GlossaryEngine: Clone + Send + 'static {
    /// Apply `request` and return the fresh state of its term.
    ///
    /// Storage failures abort the operation and are returned as errors.
    fn execute(&self, request: Request) -> Result<Request>;

    /// Look `term` up without touching storage.
    fn lookup(&self, term: &str) -> Result<Request>;

    /// Apply `request`, answering a failed operation with a no-op response.
    fn handle(&self, request: Request) -> Request {
        let operation = request.operation;
        let term = request.key.text.clone();
        match self.execute(request) {
            Ok(response) => response,
            Err(e) => {
                error!("{operation:?} of {term:?} aborted: {e}");
                self.lookup(&term)
                    .map(|mut response| {
                        response.operation = operation;
                        response
                    })
                    .unwrap_or_else(|e| {
                        error!("lookup of {term:?} failed: {e}");
                        Request::not_found(operation)
                    })
            }
        }
    }
}

/// A glossary engine over SQLite.
///
/// Clones share one connection; operations are serialized on it, which also
/// keeps `max(id) + 1` id assignment free of races.
#[derive(Clone)]
pub struct SqliteEngine {
    inner: Arc<Mutex<GlossaryDb>>,
}

impl SqliteEngine {
    /// Open the engine on the database file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = GlossaryDb::open(path.into())?;
        Ok(Self::from_db(db))
    }

    /// Open the engine on a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_db(GlossaryDb::open_in_memory()?))
    }

    fn from_db(db: GlossaryDb) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }
}

impl GlossaryEngine for SqliteEngine {
    fn execute(&self, request: Request) -> Result<Request> {
        debug!("executing {request:?}");
        let mut db = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Request {
            operation,
            key,
            values,
        } = request;
        let value = values.into_iter().next();

        match operation {
            Operation::Select => {}
            Operation::Insert => {
                let value = value.ok_or_else(|| {
                    JHelpError::ProtocolViolation("INSERT without a definition".to_string())
                })?;
                db.insert(&key.text, &value.text)?;
            }
            Operation::Update => {
                let Some(term_id) = key.id else {
                    return Ok(Request::search_first(operation));
                };
                let term = (key.state == EntryState::Update).then_some((term_id, key.text.as_str()));
                let definition = value
                    .as_ref()
                    .filter(|value| value.state == EntryState::Update)
                    .and_then(|value| value.id.map(|id| (id, value.text.as_str())));
                db.update(term, definition)?;
            }
            Operation::Delete => {
                let Some(term_id) = key.id else {
                    return Ok(Request::search_first(operation));
                };
                let definition_id = value
                    .as_ref()
                    .filter(|value| value.state == EntryState::Delete)
                    .and_then(|value| value.id);
                db.delete(
                    &key.text,
                    term_id,
                    definition_id,
                    key.state == EntryState::Delete,
                )?;
            }
            Operation::Disconnect => {
                return Err(JHelpError::ProtocolViolation(
                    "DISCONNECT is not a storage operation".to_string(),
                ));
            }
        }
        db.lookup(&key.text, operation)
    }

    fn lookup(&self, term: &str) -> Result<Request> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(term, Operation::Select)
    }
}
