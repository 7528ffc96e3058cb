//! The two-table term/definition store on top of SQLite.
//!
//! Every mutation runs in one transaction, so a branch such as
//! delete-definition-then-delete-term is applied completely or not at all.
use std::path::Path;

use rusqlite::{Connection, params};

use crate::error::Result;
use crate::protocol::{Entry, NO_DEFINITIONS, Operation, Request, UNKNOWN_TERM};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tblterms (
  id INTEGER PRIMARY KEY,
  term TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tbldefinitions (
  id INTEGER PRIMARY KEY,
  definition TEXT NOT NULL,
  term_id INTEGER NOT NULL REFERENCES tblterms(id)
);
"#;

#[derive(Debug, Clone, Copy)]
enum Table {
    Terms,
    Definitions,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Terms => "tblterms",
            Table::Definitions => "tbldefinitions",
        }
    }
}

/// Owner of the single database connection.
pub(crate) struct GlossaryDb {
    conn: Connection,
}

impl GlossaryDb {
    /// Open the store at `path`, creating the tables when they are missing.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<GlossaryDb> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a private in-memory store.
    pub(crate) fn open_in_memory() -> Result<GlossaryDb> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<GlossaryDb> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Current state of `term`, tagged with `operation`.
    pub(crate) fn lookup(&self, term: &str, operation: Operation) -> Result<Request> {
        lookup(&self.conn, term, operation)
    }

    /// Add `definition` to `term`, creating the term when it is not stored.
    pub(crate) fn insert(&mut self, term: &str, definition: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        let found = lookup(&tx, term, Operation::Insert)?;
        let term_id = match found.key.id {
            Some(id) => id,
            None => {
                let id = next_id(&tx, Table::Terms)?;
                tx.execute(
                    "INSERT INTO tblterms (id, term) VALUES (?1, ?2)",
                    params![id, term],
                )?;
                id
            }
        };
        let definition_id = next_id(&tx, Table::Definitions)?;
        tx.execute(
            "INSERT INTO tbldefinitions (id, definition, term_id) VALUES (?1, ?2, ?3)",
            params![definition_id, definition, term_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Rewrite the term text and/or one definition text.
    pub(crate) fn update(
        &mut self,
        term: Option<(i64, &str)>,
        definition: Option<(i64, &str)>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        if let Some((id, text)) = term {
            tx.execute(
                "UPDATE tblterms SET term = ?1 WHERE id = ?2",
                params![text, id],
            )?;
        }
        if let Some((id, text)) = definition {
            tx.execute(
                "UPDATE tbldefinitions SET definition = ?1 WHERE id = ?2",
                params![text, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove one definition, then the term itself when `drop_empty_term` is
    /// set and `term` has no definitions left.
    pub(crate) fn delete(
        &mut self,
        term: &str,
        term_id: i64,
        definition_id: Option<i64>,
        drop_empty_term: bool,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        if let Some(id) = definition_id {
            tx.execute("DELETE FROM tbldefinitions WHERE id = ?1", params![id])?;
        }
        let remaining = lookup(&tx, term, Operation::Delete)?;
        if drop_empty_term && !remaining.is_found() {
            tx.execute("DELETE FROM tblterms WHERE id = ?1", params![term_id])?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn lookup(conn: &Connection, term: &str, operation: Operation) -> Result<Request> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.id, t.term, d.id, d.definition \
         FROM tblterms t JOIN tbldefinitions d ON t.id = d.term_id \
         WHERE t.term = ?1 ORDER BY d.id",
    )?;
    let rows = stmt.query_map(params![term], |row| {
        Ok((
            Entry::stored(row.get(0)?, row.get::<_, String>(1)?),
            Entry::stored(row.get(2)?, row.get::<_, String>(3)?),
        ))
    })?;

    let mut key = None;
    let mut values = Vec::new();
    for row in rows {
        let (term, definition) = row?;
        key.get_or_insert(term);
        values.push(definition);
    }
    if values.is_empty() {
        values.push(Entry::new(NO_DEFINITIONS));
    }
    Ok(Request::new(
        operation,
        key.unwrap_or_else(|| Entry::new(UNKNOWN_TERM)),
        values,
    ))
}

fn next_id(conn: &Connection, table: Table) -> Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", table.name());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
