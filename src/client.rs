//! Front-end side of the protocol.
//!
//! One request is in flight per connection. The client keeps the last
//! response as its current view; edit and delete address the term and the
//! definition of that view, the way the interactive front-end does.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use log::debug;

use crate::error::{JHelpError, Result};
use crate::frame::{read_request, write_request};
use crate::protocol::{Entry, EntryState, Operation, Request};

/// A connection to the relay server.
pub struct GlossaryClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    current: Option<Request>,
}

impl GlossaryClient {
    /// Connect to the relay server at `addr`.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| JHelpError::connection(addr, e))?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            current: None,
        })
    }

    /// Send `request` and wait for its response.
    ///
    /// A `DISCONNECT` from the server, or a closed connection, is
    /// [`JHelpError::Disconnected`].
    pub fn call(&mut self, request: &Request) -> Result<Request> {
        debug!("sending {request:?}");
        write_request(&mut self.writer, request)?;
        match read_request(&mut self.reader)? {
            Some(response) if response.operation != Operation::Disconnect => {
                debug!("received {response:?}");
                self.current = Some(response.clone());
                Ok(response)
            }
            _ => Err(JHelpError::Disconnected),
        }
    }

    /// The last response received.
    pub fn current(&self) -> Option<&Request> {
        self.current.as_ref()
    }

    /// Look `term` up.
    pub fn find(&mut self, term: &str) -> Result<Request> {
        self.call(&Request::select(term))
    }

    /// Add `definition` to `term`.
    pub fn add(&mut self, term: &str, definition: &str) -> Result<Request> {
        self.call(&Request::insert(term, definition))
    }

    /// Rewrite the current term and its definition number `index`.
    ///
    /// Entries are only marked for update when their text changes.
    pub fn edit(&mut self, index: usize, term: &str, definition: &str) -> Result<Request> {
        let (mut key, mut value) = self.selection(index, term, definition);
        if self.current.as_ref().map(|c| c.key.text.as_str()) != Some(term) {
            key.state = EntryState::Update;
        }
        if self.selected(index).map(|v| v.text.as_str()) != Some(definition) {
            value.state = EntryState::Update;
        }
        self.call(&Request::update(key, value))
    }

    /// Delete definition number `index` of the current term, and the term
    /// once it has no definitions left.
    pub fn delete(&mut self, index: usize) -> Result<Request> {
        let term = self
            .current
            .as_ref()
            .map(|c| c.key.text.clone())
            .unwrap_or_default();
        let (key, value) = self.selection(index, &term, "");
        self.call(&Request::delete(
            key.with_state(EntryState::Delete),
            value.with_state(EntryState::Delete),
        ))
    }

    /// Send `DISCONNECT` and close the connection.
    pub fn disconnect(mut self) -> Result<()> {
        write_request(&mut self.writer, &Request::disconnect())?;
        // The acknowledgement is best effort.
        let _ = read_request(&mut self.reader);
        Ok(())
    }

    fn selected(&self, index: usize) -> Option<&Entry> {
        self.current.as_ref().and_then(|c| c.values.get(index))
    }

    /// Key and value entries carrying the ids of the current view.
    fn selection(&self, index: usize, term: &str, definition: &str) -> (Entry, Entry) {
        let mut key = Entry::new(term);
        key.id = self.current.as_ref().and_then(|c| c.key.id);
        let mut value = Entry::new(definition);
        value.id = self.selected(index).and_then(|v| v.id);
        (key, value)
    }
}
