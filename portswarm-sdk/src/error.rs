//! Error types for the wire layer.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Failure to establish a session. Never fatal to the swarm: the owning
/// unit either retries or gives up according to its reconnect policy.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} has no {family} address to reach from {local}")]
    NoAddressForFamily {
        host: String,
        local: IpAddr,
        family: &'static str,
    },

    #[error("failed to bind {local}: {source}")]
    Bind {
        local: IpAddr,
        #[source]
        source: io::Error,
    },

    #[error("connect to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("connect to {host}:{port} timed out after {after:?}")]
    Timeout {
        host: String,
        port: u16,
        after: Duration,
    },
}

/// Mid-session read or write failure. Treated exactly like the peer closing
/// the connection: the cycle ends.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("connection already closed")]
    Closed,
}

/// A line that does not have the shape of an IRC message. Never fatal; the
/// offending line is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("line has no command")]
    MissingCommand,

    #[error("{command} needs at least {needed} parameters, got {got}")]
    MissingParams {
        command: String,
        needed: usize,
        got: usize,
    },

    #[error("i/o error while framing: {0}")]
    Io(String),
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e.to_string())
    }
}

impl From<ParseError> for TransportError {
    fn from(e: ParseError) -> Self {
        TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
