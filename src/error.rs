//! Error
//!
//! This module provides the errors shared by every tier of the glossary,
//! built with [`thiserror`].
//!
use std::io;
use thiserror::Error;

/// Result use the [`JHelpError`] as error.
pub type Result<T> = std::result::Result<T, JHelpError>;

/// JHelpError is the error for the protocol, the relay and the persistence tier.
#[derive(Error, Debug)]
pub enum JHelpError {
    /// Bind, accept or connect failures.
    #[error("cannot connect to {addr}: {source}")]
    Connection {
        /// The address that could not be bound or reached.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Read or write failure in the middle of a session.
    #[error("transport error {0}")]
    Transport(#[from] io::Error),

    /// Query or execute failure in the relational store.
    #[error("storage error {0}")]
    Storage(#[from] rusqlite::Error),

    /// Malformed or out-of-sequence message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A request could not be encoded for the wire.
    #[error("serialization error {0}")]
    Serialization(#[from] bincode::error::EncodeError),

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The peer closed the session or announced `DISCONNECT`.
    #[error("disconnected, manual reconnect required")]
    Disconnected,
}

impl JHelpError {
    /// The taxonomy bucket of this error, as shown to users.
    pub fn kind(&self) -> &'static str {
        match self {
            JHelpError::Connection { .. } => "ConnectionError",
            JHelpError::Transport(_) | JHelpError::Serialization(_) | JHelpError::Disconnected => {
                "TransportError"
            }
            JHelpError::Storage(_) => "StorageError",
            JHelpError::ProtocolViolation(_) => "ProtocolViolation",
            JHelpError::Config(_) => "ConfigError",
        }
    }

    pub(crate) fn connection(addr: impl ToString, source: io::Error) -> Self {
        JHelpError::Connection {
            addr: addr.to_string(),
            source,
        }
    }
}
