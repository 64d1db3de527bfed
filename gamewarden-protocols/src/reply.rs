//! Classification of Frostbite command replies.

use thiserror::Error;

/// Status word sent back on success.
pub const OK: &str = "OK";

/// Failure of a single RCON command. The connection itself is still usable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Command '{command}' disallowed by the server: {status}")]
    Disallowed { command: String, status: String },

    #[error("Command '{command}' failed: {status}")]
    Failed {
        command: String,
        status: String,
        details: Vec<String>,
    },

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Command '{0}' timed out")]
    Timeout(String),
}

impl CommandError {
    /// The server's status word, if the server answered at all.
    pub fn status(&self) -> Option<&str> {
        match self {
            CommandError::Disallowed { status, .. } | CommandError::Failed { status, .. } => {
                Some(status)
            }
            CommandError::UnknownCommand(_) => Some("UnknownCommand"),
            CommandError::Timeout(_) => None,
        }
    }

    pub fn is_not_in_list(&self) -> bool {
        self.status() == Some("NotInList")
    }

    pub fn is_invalid_password(&self) -> bool {
        matches!(self.status(), Some("InvalidPasswordHash" | "InvalidPassword"))
    }
}

/// Splits a reply into its payload words or the matching [`CommandError`].
pub fn classify_reply(command: &str, words: &[String]) -> Result<Vec<String>, CommandError> {
    let Some(status) = words.first() else {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: "EmptyReply".to_string(),
            details: Vec::new(),
        });
    };

    match status.as_str() {
        OK => Ok(words[1..].to_vec()),
        "UnknownCommand" => Err(CommandError::UnknownCommand(command.to_string())),
        s if s.starts_with("CommandDisallowed") || s == "CommandIsReadOnly" => {
            Err(CommandError::Disallowed {
                command: command.to_string(),
                status: status.clone(),
            })
        }
        _ => Err(CommandError::Failed {
            command: command.to_string(),
            status: status.clone(),
            details: words[1..].to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(w: &[&str]) -> Vec<String> {
        w.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ok_strips_status() {
        assert_eq!(
            classify_reply("version", &words(&["OK", "BF3", "872601"])),
            Ok(words(&["BF3", "872601"]))
        );
    }

    #[test]
    fn test_error_families() {
        assert_eq!(
            classify_reply("foo.bar", &words(&["UnknownCommand"])),
            Err(CommandError::UnknownCommand("foo.bar".into()))
        );
        assert!(matches!(
            classify_reply("vars.ranked", &words(&["CommandIsReadOnly"])),
            Err(CommandError::Disallowed { .. })
        ));
        let err = classify_reply("banList.remove", &words(&["NotInList"])).unwrap_err();
        assert!(err.is_not_in_list());
        let err = classify_reply("login.plainText", &words(&["InvalidPassword"])).unwrap_err();
        assert!(err.is_invalid_password());
        assert_eq!(classify_reply("x", &[]).unwrap_err().status(), Some("EmptyReply"));
    }
}
