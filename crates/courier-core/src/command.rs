//! Inbound message classification: slash commands vs. prompt text.

/// The closed set of chat commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/use [name]`: bind this channel to a project, or show the binding.
    Use { name: Option<String> },
    /// `/projects`: list configured projects.
    Projects,
    /// `/add <name> <path> [description…]`
    Add {
        name: String,
        path: String,
        description: Option<String>,
    },
    /// `/remove <name>`
    Remove { name: String },
    /// `/clear`: next prompt starts a fresh conversation.
    Clear,
    /// `/stop`: kill the running assistant process for this channel.
    Stop,
    /// `/status`
    Status,
    /// `/help`
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    Command(Command),
    /// A known command with the wrong arguments; reply with its usage line.
    Malformed { usage: String },
    Unknown { name: String },
    Prompt(String),
}

pub const ADD_USAGE: &str = "Usage: /add <name> <path> [description]";
pub const REMOVE_USAGE: &str = "Usage: /remove <name>";

/// Classify an inbound text message.
///
/// Commands start with `/`; the command word is case-insensitive and may
/// carry a Telegram-style `@botname` suffix. Everything else is a prompt.
pub fn parse_message(text: &str) -> ParsedMessage {
    let text = text.trim();

    let Some(rest) = text.strip_prefix('/') else {
        return ParsedMessage::Prompt(text.to_owned());
    };

    let mut words = rest.split_whitespace();
    let Some(word) = words.next() else {
        return ParsedMessage::Prompt(text.to_owned());
    };

    let name = word
        .split('@')
        .next()
        .unwrap_or(word)
        .to_ascii_lowercase();
    let args: Vec<&str> = words.collect();

    let command = match name.as_str() {
        "use" => Command::Use {
            name: args.first().map(|s| (*s).to_owned()),
        },
        "projects" => Command::Projects,
        "add" => match (args.first(), args.get(1)) {
            (Some(name), Some(path)) => Command::Add {
                name: (*name).to_owned(),
                path: (*path).to_owned(),
                description: (!args[2..].is_empty()).then(|| args[2..].join(" ")),
            },
            _ => {
                return ParsedMessage::Malformed {
                    usage: ADD_USAGE.to_owned(),
                }
            }
        },
        "remove" => match args.first() {
            Some(name) => Command::Remove {
                name: (*name).to_owned(),
            },
            None => {
                return ParsedMessage::Malformed {
                    usage: REMOVE_USAGE.to_owned(),
                }
            }
        },
        "clear" => Command::Clear,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "help" | "start" => Command::Help,
        _ => return ParsedMessage::Unknown { name },
    };

    ParsedMessage::Command(command)
}
