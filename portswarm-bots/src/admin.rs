//! Administrative commands issued by the master nick in the hub channel.
//!
//! Syntax is `{prefix}{keyword} args...`, whitespace separated and case
//! sensitive. Commands with too few arguments are rejected here and ignored
//! by the caller without telling the issuer.

use thiserror::Error;

/// Keyword list shown by the help command.
pub fn help_text(prefix: &str) -> String {
    format!(
        "Commands: {p}mjoin <channel>, {p}mpart <channel>, {p}msay <channel> <msg>, \
{p}maction <channel> <msg>, {p}mmode <channel> <modes>, {p}opall <channel>, {p}help",
        p = prefix
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `.mjoin <channel>`
    Join { channel: String },
    /// `.mpart <channel>`
    Part { channel: String },
    /// `.msay <target> <text...>`
    Say { target: String, text: String },
    /// `.maction <target> <text...>`
    Action { target: String, text: String },
    /// `.mmode <target> <modes...>`
    Mode { target: String, modes: String },
    /// `.opall <channel>`
    OpAll { channel: String },
    /// `.help`
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not a command")]
    NotACommand,

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("{keyword} needs {needed} argument(s), got {got}")]
    MissingArgument {
        keyword: &'static str,
        needed: usize,
        got: usize,
    },
}

impl AdminCommand {
    /// Parse a hub message body.
    pub fn parse(text: &str, prefix: &str) -> Result<AdminCommand, CommandError> {
        let mut words = text.split_whitespace();
        let keyword = words
            .next()
            .and_then(|w| w.strip_prefix(prefix))
            .ok_or(CommandError::NotACommand)?;
        let args: Vec<&str> = words.collect();

        let need = |keyword: &'static str, needed: usize| {
            if args.len() < needed {
                Err(CommandError::MissingArgument {
                    keyword,
                    needed,
                    got: args.len(),
                })
            } else {
                Ok(())
            }
        };

        let cmd = match keyword {
            "mjoin" => {
                need("mjoin", 1)?;
                AdminCommand::Join {
                    channel: args[0].to_string(),
                }
            }
            "mpart" => {
                need("mpart", 1)?;
                AdminCommand::Part {
                    channel: args[0].to_string(),
                }
            }
            "msay" => {
                need("msay", 2)?;
                AdminCommand::Say {
                    target: args[0].to_string(),
                    text: args[1..].join(" "),
                }
            }
            "maction" => {
                need("maction", 2)?;
                AdminCommand::Action {
                    target: args[0].to_string(),
                    text: args[1..].join(" "),
                }
            }
            "mmode" => {
                need("mmode", 2)?;
                AdminCommand::Mode {
                    target: args[0].to_string(),
                    modes: args[1..].join(" "),
                }
            }
            "opall" => {
                need("opall", 1)?;
                AdminCommand::OpAll {
                    channel: args[0].to_string(),
                }
            }
            "help" => AdminCommand::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<AdminCommand, CommandError> {
        AdminCommand::parse(text, ".")
    }

    #[test]
    fn parses_each_keyword() {
        assert_eq!(
            parse(".mjoin #x").unwrap(),
            AdminCommand::Join { channel: "#x".into() }
        );
        assert_eq!(
            parse(".mpart #x").unwrap(),
            AdminCommand::Part { channel: "#x".into() }
        );
        assert_eq!(
            parse(".msay #x hello   world").unwrap(),
            AdminCommand::Say {
                target: "#x".into(),
                text: "hello world".into()
            }
        );
        assert_eq!(
            parse(".maction #x waves").unwrap(),
            AdminCommand::Action {
                target: "#x".into(),
                text: "waves".into()
            }
        );
        assert_eq!(
            parse(".mmode #x +b *!*@bad").unwrap(),
            AdminCommand::Mode {
                target: "#x".into(),
                modes: "+b *!*@bad".into()
            }
        );
        assert_eq!(
            parse(".opall #hub").unwrap(),
            AdminCommand::OpAll { channel: "#hub".into() }
        );
        assert_eq!(parse(".help").unwrap(), AdminCommand::Help);
    }

    #[test]
    fn too_few_arguments() {
        assert_eq!(
            parse(".mjoin"),
            Err(CommandError::MissingArgument {
                keyword: "mjoin",
                needed: 1,
                got: 0
            })
        );
        assert!(matches!(
            parse(".msay #x"),
            Err(CommandError::MissingArgument { needed: 2, got: 1, .. })
        ));
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(parse(".MJOIN #x"), Err(CommandError::Unknown("MJOIN".into())));
    }

    #[test]
    fn ordinary_chatter_is_not_a_command() {
        assert_eq!(parse("hello .mjoin #x"), Err(CommandError::NotACommand));
        assert_eq!(parse(""), Err(CommandError::NotACommand));
    }

    #[test]
    fn help_lists_keywords_with_prefix() {
        let text = help_text(".");
        assert!(text.starts_with("Commands: .mjoin <channel>"));
        assert!(text.ends_with(".opall <channel>, .help"));
    }

    #[test]
    fn custom_prefix() {
        assert_eq!(
            AdminCommand::parse("!opall #hub", "!").unwrap(),
            AdminCommand::OpAll { channel: "#hub".into() }
        );
    }
}
