use std::collections::HashSet;

use threadline_session::{Notice, NoticeLevel};
use threadline_types::{Message, MessageRole, SendState, Thread};

/// Prints each finalized message once, plus transient status lines
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashSet<String>,
    local_user_id: String,
}

impl Transcript {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            printed: HashSet::new(),
            local_user_id: local_user_id.into(),
        }
    }

    /// Lines for messages not shown yet. Streaming and pending messages wait
    /// until they settle; confirmed ids replace provisional ones silently.
    pub fn new_lines(&mut self, messages: &[Message]) -> Vec<String> {
        let mut lines = Vec::new();

        for message in messages {
            if message.is_streaming || message.is_pending() {
                continue;
            }
            if !self.printed.insert(message.id.clone()) {
                continue;
            }
            if message.send_state == Some(SendState::Sent) && message.author_id() == Some(self.local_user_id.as_str()) {
                // Our own line was echoed when it was typed
                continue;
            }
            lines.push(self.format(message));
        }

        lines
    }

    pub fn format(&self, message: &Message) -> String {
        let author = match message.role {
            MessageRole::Agent => "agent".to_string(),
            MessageRole::System => "system".to_string(),
            MessageRole::User => match message.author_id() {
                Some(id) if id == self.local_user_id => "you".to_string(),
                Some(id) => id.to_string(),
                None => "user".to_string(),
            },
        };
        let failed = if message.has_failed() { " (not sent, /retry)" } else { "" };
        format!("[{}] {}: {}{}", message.created_at.format("%H:%M"), author, message.display_content(), failed)
    }
}

pub fn notice_line(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Info => "i",
        NoticeLevel::Success => "+",
        NoticeLevel::Error => "!",
    };
    format!("({}) {}: {}", marker, notice.title, notice.description)
}

pub fn thread_line(thread: &Thread) -> String {
    let role = thread.user_role.map(|r| r.as_str()).unwrap_or("?");
    format!("{}  {}  [{}, {} messages]", thread.id, thread.title, role, thread.message_count)
}
