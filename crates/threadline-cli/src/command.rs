/// One line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Retry,
    Reconnect,
    Participants,
    Threads,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };

        Some(match rest.split_whitespace().next().unwrap_or_default() {
            "retry" => Command::Retry,
            "reconnect" => Command::Reconnect,
            "who" | "participants" => Command::Participants,
            "threads" => Command::Threads,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

pub const HELP: &str = "\
/retry         resend the last failed message
/reconnect     reconnect after the connection gave up
/who           list connected participants
/threads       list your threads
/quit          leave";
