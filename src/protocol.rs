//! Messages exchanged between the front-end, the relay and the persistence tier.
//!
//! Every hop carries the same [`Request`] shape: an [`Operation`], one key
//! [`Entry`] for the term and an ordered list of value entries for its
//! definitions. Requests travelling towards the persistence tier tag entries
//! with an [`EntryState`]; responses always carry [`EntryState::Origin`].

use serde::{Deserialize, Serialize};

/// Placeholder text of the key when the term is not stored.
pub const UNKNOWN_TERM: &str = "Unknown term";
/// Placeholder text of the single value when a term has no definitions.
pub const NO_DEFINITIONS: &str = "Definitions not found";
/// Placeholder text answered to UPDATE/DELETE sent before any search.
pub const SEARCH_FIRST: &str = "**At first do a search**";

/// What a request asks the persistence tier to do.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read the term and its definitions.
    Select,
    /// Add a definition, creating the term when it is missing.
    Insert,
    /// Rewrite the term and/or one definition.
    Update,
    /// Remove one definition, and the term once it has none left.
    Delete,
    /// Tear the connection down.
    Disconnect,
}

/// What the sender wants done to one specific entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// Unchanged, as read from storage.
    #[default]
    Origin,
    /// New entry.
    Insert,
    /// Entry text changed.
    Update,
    /// Entry to be removed.
    Delete,
}

/// One term or definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Row id in its table, `None` when not persisted or not found.
    pub id: Option<i64>,
    /// The term or definition string.
    pub text: String,
    /// Pending change requested by the sender.
    pub state: EntryState,
}

impl Entry {
    /// An entry that has not been persisted yet.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            state: EntryState::Origin,
        }
    }

    /// An entry read back from storage.
    pub fn stored(id: i64, text: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            text: text.into(),
            state: EntryState::Origin,
        }
    }

    /// Returns the entry tagged with `state`.
    pub fn with_state(mut self, state: EntryState) -> Self {
        self.state = state;
        self
    }

    /// Whether the entry refers to a stored row.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// The unit of exchange between every pair of tiers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requested operation.
    pub operation: Operation,
    /// The term.
    pub key: Entry,
    /// Definitions attached to the term.
    pub values: Vec<Entry>,
}

impl Request {
    /// Builds a request from its parts.
    pub fn new(operation: Operation, key: Entry, values: Vec<Entry>) -> Self {
        Self {
            operation,
            key,
            values,
        }
    }

    /// Looks up `term`.
    pub fn select(term: impl Into<String>) -> Self {
        Self::new(Operation::Select, Entry::new(term), Vec::new())
    }

    /// Adds `definition` to `term`.
    pub fn insert(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self::new(
            Operation::Insert,
            Entry::new(term),
            vec![Entry::new(definition).with_state(EntryState::Insert)],
        )
    }

    /// Updates the entries whose state is [`EntryState::Update`].
    pub fn update(key: Entry, value: Entry) -> Self {
        Self::new(Operation::Update, key, vec![value])
    }

    /// Deletes the entries whose state is [`EntryState::Delete`].
    pub fn delete(key: Entry, value: Entry) -> Self {
        Self::new(Operation::Delete, key, vec![value])
    }

    /// The teardown message of the disconnect handshake.
    pub fn disconnect() -> Self {
        Self::new(Operation::Disconnect, Entry::new(""), Vec::new())
    }

    /// The response for a term that is not stored.
    pub fn not_found(operation: Operation) -> Self {
        Self::new(
            operation,
            Entry::new(UNKNOWN_TERM),
            vec![Entry::new(NO_DEFINITIONS)],
        )
    }

    /// The response to UPDATE/DELETE sent without a located term.
    pub fn search_first(operation: Operation) -> Self {
        Self::new(
            operation,
            Entry::new(UNKNOWN_TERM),
            vec![Entry::new(SEARCH_FIRST)],
        )
    }

    /// The stored term, if the key refers to one.
    pub fn term(&self) -> Option<&Entry> {
        Some(&self.key).filter(|key| key.is_persisted())
    }

    /// The stored definitions, skipping placeholders.
    pub fn definitions(&self) -> impl Iterator<Item = &Entry> {
        self.values.iter().filter(|value| value.is_persisted())
    }

    /// Whether the key refers to a stored term.
    pub fn is_found(&self) -> bool {
        self.key.is_persisted()
    }

    /// The first value entry, the one UPDATE/DELETE act on.
    pub fn value(&self) -> Option<&Entry> {
        self.values.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_not_definitions() {
        let response = Request::not_found(Operation::Select);
        assert!(!response.is_found());
        assert!(response.term().is_none());
        assert_eq!(response.definitions().count(), 0);
        assert_eq!(response.values.len(), 1);
        assert_eq!(response.values[0].text, NO_DEFINITIONS);
    }

    #[test]
    fn insert_tags_the_definition() {
        let request = Request::insert("foo", "bar");
        assert_eq!(request.operation, Operation::Insert);
        assert_eq!(request.key, Entry::new("foo"));
        assert_eq!(request.value().map(|v| v.state), Some(EntryState::Insert));
    }
}
