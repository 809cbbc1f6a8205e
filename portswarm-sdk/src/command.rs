//! Outbound commands and their wire form.

use std::fmt;

use crate::ctcp::{Ctcp, CtcpKind};

/// Commands a swarm client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Nick(String),
    User { ident: String, realname: String },
    Join(String),
    Part(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    /// `MODE target modes args...`; `modes` may itself contain spaces when
    /// relayed verbatim.
    Mode {
        target: String,
        modes: String,
        args: Vec<String>,
    },
    Pong(String),
    Quit(Option<String>),
}

impl Command {
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::Privmsg {
            target: target.into(),
            text: text.into(),
        }
    }

    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::Notice {
            target: target.into(),
            text: text.into(),
        }
    }

    /// A CTCP reply, carried in a NOTICE.
    pub fn ctcp_reply(target: impl Into<String>, kind: CtcpKind, params: Option<&str>) -> Self {
        Command::notice(target, Ctcp::new(kind, params).to_string())
    }

    /// `/me` style action, carried in a PRIVMSG.
    pub fn action(target: impl Into<String>, text: &str) -> Self {
        Command::privmsg(target, Ctcp::new(CtcpKind::Action, Some(text)).to_string())
    }

    /// Grant channel operator to every nick in one MODE line.
    pub fn op_batch(channel: impl Into<String>, nicks: &[String]) -> Self {
        Command::Mode {
            target: channel.into(),
            modes: format!("+{}", "o".repeat(nicks.len())),
            args: nicks.to_vec(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Nick(nick) => write!(f, "NICK {nick}"),
            Command::User { ident, realname } => write!(f, "USER {ident} 0 * :{realname}"),
            Command::Join(channel) => write!(f, "JOIN {channel}"),
            Command::Part(channel) => write!(f, "PART {channel}"),
            Command::Privmsg { target, text } => write!(f, "PRIVMSG {target} :{text}"),
            Command::Notice { target, text } => write!(f, "NOTICE {target} :{text}"),
            Command::Mode {
                target,
                modes,
                args,
            } => {
                write!(f, "MODE {target} {modes}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Command::Pong(payload) => write!(f, "PONG :{payload}"),
            Command::Quit(Some(reason)) => write!(f, "QUIT :{reason}"),
            Command::Quit(None) => write!(f, "QUIT"),
        }
    }
}
