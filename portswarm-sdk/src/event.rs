//! Inbound events decoded from server lines, for the state machine to consume.

use crate::error::ParseError;
use crate::irc::Message;

/// RPL_ENDOFMOTD.
pub const RPL_ENDOFMOTD: &str = "376";
/// ERR_NOMOTD, sent instead of the MOTD when the server has none.
pub const ERR_NOMOTD: &str = "422";

/// Modes whose argument is consumed whether set or unset.
const MODES_WITH_ARG: &[char] = &['o', 'v', 'h', 'a', 'q', 'b', 'e', 'I', 'k'];
/// Modes whose argument is consumed only when set.
const MODES_WITH_ARG_ON_SET: &[char] = &['l'];

/// One `+x`/`-x` step of a MODE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub mode: char,
    pub arg: Option<String>,
}

/// Events the swarm reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Server liveness check; must be answered with the same payload.
    Ping { payload: String },

    /// End of the welcome/MOTD sequence.
    EndOfMotd,

    /// Someone (possibly us) joined a channel.
    Joined { channel: String, nick: String },

    /// Someone was kicked from a channel.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: String,
    },

    /// Channel or user mode changed.
    ModeChanged {
        target: String,
        set_by: String,
        changes: Vec<ModeChange>,
    },

    /// A message in a channel or a private message.
    Message {
        from: String,
        target: String,
        text: String,
    },

    /// A notice.
    Notice {
        from: String,
        target: String,
        text: String,
    },

    /// Anything else, kept by command name for logging.
    Other { command: String },
}

impl Event {
    /// Parse a raw line into an event.
    pub fn parse(line: &str) -> Result<Event, ParseError> {
        Event::from_message(&Message::parse(line)?)
    }

    /// Decode an already parsed message.
    pub fn from_message(msg: &Message) -> Result<Event, ParseError> {
        let from = || msg.source_nick().unwrap_or("server").to_string();

        let event = match msg.command.as_str() {
            "PING" => Event::Ping {
                payload: msg.params.last().cloned().unwrap_or_default(),
            },
            RPL_ENDOFMOTD | ERR_NOMOTD => Event::EndOfMotd,
            "JOIN" => {
                msg.require_params(1)?;
                Event::Joined {
                    channel: msg.params[0].clone(),
                    nick: from(),
                }
            }
            "KICK" => {
                msg.require_params(2)?;
                Event::Kicked {
                    channel: msg.params[0].clone(),
                    nick: msg.params[1].clone(),
                    by: from(),
                    reason: msg.params.get(2).cloned().unwrap_or_default(),
                }
            }
            "MODE" => {
                msg.require_params(2)?;
                Event::ModeChanged {
                    target: msg.params[0].clone(),
                    set_by: from(),
                    changes: parse_mode_changes(&msg.params[1], &msg.params[2..]),
                }
            }
            "PRIVMSG" => {
                msg.require_params(2)?;
                Event::Message {
                    from: from(),
                    target: msg.params[0].clone(),
                    text: msg.params[1].clone(),
                }
            }
            "NOTICE" => {
                msg.require_params(2)?;
                Event::Notice {
                    from: from(),
                    target: msg.params[0].clone(),
                    text: msg.params[1].clone(),
                }
            }
            other => Event::Other {
                command: other.to_string(),
            },
        };
        Ok(event)
    }
}

/// Whether a target names a channel rather than a user.
pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

/// Walk a mode string, pairing each parameter-taking mode with its argument.
/// A missing argument yields `arg: None` instead of an error.
pub fn parse_mode_changes(modes: &str, args: &[String]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut args = args.iter();
    let mut adding = true;
    for mode in modes.chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            _ => {
                let takes_arg = MODES_WITH_ARG.contains(&mode)
                    || (adding && MODES_WITH_ARG_ON_SET.contains(&mode));
                let arg = if takes_arg { args.next().cloned() } else { None };
                changes.push(ModeChange { adding, mode, arg });
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_payload_verbatim() {
        assert_eq!(
            Event::parse("PING :abc").unwrap(),
            Event::Ping { payload: "abc".into() }
        );
        assert_eq!(
            Event::parse("PING irc.example.net").unwrap(),
            Event::Ping { payload: "irc.example.net".into() }
        );
    }

    #[test]
    fn end_of_motd_and_no_motd() {
        assert_eq!(
            Event::parse(":srv 376 port001c :End of /MOTD command.").unwrap(),
            Event::EndOfMotd
        );
        assert_eq!(
            Event::parse(":srv 422 port001c :MOTD File is missing").unwrap(),
            Event::EndOfMotd
        );
    }

    #[test]
    fn kick_with_reason() {
        let ev = Event::parse(":op!o@h KICK #x port002 :bye").unwrap();
        assert_eq!(
            ev,
            Event::Kicked {
                channel: "#x".into(),
                nick: "port002".into(),
                by: "op".into(),
                reason: "bye".into(),
            }
        );
    }

    #[test]
    fn short_kick_is_a_parse_error() {
        assert!(matches!(
            Event::parse(":op KICK #x"),
            Err(ParseError::MissingParams { needed: 2, got: 1, .. })
        ));
    }

    #[test]
    fn mode_arguments_line_up() {
        let ev = Event::parse(":op MODE #hub +vo-o+l a b c 10").unwrap();
        let Event::ModeChanged { changes, .. } = ev else {
            panic!("expected mode change");
        };
        let pairs: Vec<_> = changes
            .iter()
            .map(|c| (c.adding, c.mode, c.arg.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (true, 'v', Some("a")),
                (true, 'o', Some("b")),
                (false, 'o', Some("c")),
                (true, 'l', Some("10")),
            ]
        );
    }

    #[test]
    fn user_mode_without_args() {
        let ev = Event::parse(":port001c MODE port001c :+iw").unwrap();
        let Event::ModeChanged { target, changes, .. } = ev else {
            panic!("expected mode change");
        };
        assert!(!is_channel(&target));
        assert!(changes.iter().all(|c| c.arg.is_none()));
    }

    #[test]
    fn unset_limit_takes_no_argument() {
        let changes = parse_mode_changes("-l+o", &["port003".to_string()]);
        assert_eq!(changes[0].arg, None);
        assert_eq!(changes[1].arg.as_deref(), Some("port003"));
    }

    #[test]
    fn unknown_command_is_other() {
        assert_eq!(
            Event::parse(":srv 001 me :Welcome").unwrap(),
            Event::Other { command: "001".into() }
        );
    }
}
