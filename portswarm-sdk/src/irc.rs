//! Raw IRC message parsing.
//!
//! `[@tags] [:prefix] COMMAND [params...] [:trailing]`

use std::collections::HashMap;

use crate::error::ParseError;

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// IRCv3 message tags (values are kept escaped).
    pub tags: HashMap<String, String>,
    /// Source of the message, without the leading `:`.
    pub prefix: Option<String>,
    /// Command or three-digit numeric, uppercased.
    pub command: String,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a single line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Message, ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut tags = HashMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
            for tag in raw_tags.split(';').filter(|t| !t.is_empty()) {
                let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
                tags.insert(key.to_string(), value.to_string());
            }
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (source, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(source.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host` → `nick`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split(['!', '@']).next())
            .filter(|n| !n.is_empty())
    }

    /// Fail with [`ParseError::MissingParams`] unless at least `needed`
    /// parameters are present.
    pub fn require_params(&self, needed: usize) -> Result<(), ParseError> {
        if self.params.len() < needed {
            return Err(ParseError::MissingParams {
                command: self.command.clone(),
                needed,
                got: self.params.len(),
            });
        }
        Ok(())
    }
}
