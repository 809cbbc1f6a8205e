//! portswarm-sdk: IRC wire layer for the portswarm client swarm.
//!
//! - [`connection`]: source-bound TCP connection with paced sends and
//!   bounded receives
//! - [`codec`]: newline framing
//! - [`irc`] / [`event`]: inbound line parsing and decoding
//! - [`command`] / [`ctcp`]: outbound commands

pub mod codec;
pub mod command;
pub mod connection;
pub mod ctcp;
pub mod error;
pub mod event;
pub mod irc;

pub use command::Command;
pub use connection::{CommandSink, ConnectConfig, Connection, Received};
pub use error::{ConnectError, ParseError, TransportError};
pub use event::Event;
