//! CTCP: out-of-band queries carried inside `PRIVMSG`/`NOTICE` bodies,
//! delimited by `\x01`.

use std::fmt;

/// The CTCP delimiter byte.
pub const DELIM: char = '\x01';

/// CTCP commands the swarm knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtcpKind {
    Action,
    Version,
    Ping,
    Time,
    Unknown(String),
}

impl CtcpKind {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            "TIME" => Self::Time,
            _ => Self::Unknown(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Time => "TIME",
            Self::Unknown(s) => s,
        }
    }
}

/// A parsed CTCP body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctcp<'a> {
    pub kind: CtcpKind,
    /// Everything after the command name, verbatim.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse a message body. Returns `None` unless it starts with `\x01`.
    /// The closing delimiter is optional, as many clients omit it.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(DELIM)?;
        let inner = inner.strip_suffix(DELIM).unwrap_or(inner);
        let (name, params) = match inner.split_once(' ') {
            Some((name, params)) => (name, Some(params).filter(|p| !p.is_empty())),
            None => (inner, None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Ctcp {
            kind: CtcpKind::parse(name),
            params,
        })
    }

    pub fn new(kind: CtcpKind, params: Option<&'a str>) -> Self {
        Ctcp { kind, params }
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params {
            Some(p) => write!(f, "{DELIM}{} {p}{DELIM}", self.kind.as_str()),
            None => write!(f, "{DELIM}{}{DELIM}", self.kind.as_str()),
        }
    }
}
