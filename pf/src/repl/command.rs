//! Slash command parsing

/// A parsed `/command [argument]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Agent(Option<String>),
    Status,
    Caps,
    Analyze(Option<String>),
    Generate(Option<String>),
    Regenerate(Option<String>),
    Reset,
    History,
    Unknown(String),
}

impl SlashCommand {
    /// Parse a line starting with `/`; the argument is the rest of the line
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (cmd, arg) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, Some(rest.trim().to_string()).filter(|a| !a.is_empty())),
            None => (input, None),
        };

        match cmd {
            "/help" | "/h" => Self::Help,
            "/quit" | "/q" | "/exit" => Self::Quit,
            "/agent" | "/a" => Self::Agent(arg),
            "/status" | "/s" => Self::Status,
            "/caps" => Self::Caps,
            "/analyze" => Self::Analyze(arg),
            "/generate" | "/gen" => Self::Generate(arg),
            "/regenerate" | "/regen" => Self::Regenerate(arg),
            "/reset" => Self::Reset,
            "/history" => Self::History,
            other => Self::Unknown(other.to_string()),
        }
    }
}
