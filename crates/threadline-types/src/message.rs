use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::thread::ParticipantRole;

const FINAL_ANSWER_MARKER: &str = "Final Answer:";
const SCAFFOLD_PREFIXES: [&str; 3] = ["Thought:", "Action Input:", "Action:"];

/// Author of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

impl MessageRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "agent" | "assistant" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Action,
    Thought,
    Memory,
}

/// Delivery state of a locally-originated (optimistic) message.
///
/// Messages received from the server never carry a send state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Shown locally, transmission not yet confirmed
    Pending,
    /// Handed to the connection (or echoed back by the server)
    Sent,
    /// Transmission errored or timed out; can be retried
    Failed,
}

/// Opaque metadata bag attached to a message.
///
/// `user_role` records the author's role at the time of writing and is only
/// used for badges; permission checks always consult live presence state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<ParticipantRole>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One conversational turn in a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub content: String,
    pub role: MessageRole,
    
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    
    #[serde(default, rename = "message_metadata")]
    pub metadata: MessageMetadata,
    
    pub created_at: DateTime<Utc>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    
    /// True only for the single in-flight agent message receiving snapshots
    #[serde(skip)]
    pub is_streaming: bool,
    
    #[serde(skip)]
    pub send_state: Option<SendState>,
}

impl Message {
    fn base(
        id: String,
        thread_id: impl Into<String>,
        content: impl Into<String>,
        role: MessageRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            thread_id: thread_id.into(),
            content: content.into(),
            role,
            message_type: MessageType::Text,
            agent_id: None,
            parent_id: None,
            metadata: MessageMetadata::default(),
            created_at,
            processed_at: None,
            is_streaming: false,
            send_state: None,
        }
    }
    
    /// Locally-synthesized user message shown before the server confirms it
    pub fn optimistic(
        thread_id: impl Into<String>,
        content: impl Into<String>,
        user_id: impl Into<String>,
        user_role: Option<ParticipantRole>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut message = Self::base(
            provisional_id("user", now),
            thread_id,
            content,
            MessageRole::User,
            now,
        );
        message.metadata.user_id = Some(user_id.into());
        message.metadata.user_role = user_role;
        message.send_state = Some(SendState::Pending);
        message
    }
    
    /// Agent message currently receiving streamed snapshots
    pub fn streaming_placeholder(
        thread_id: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut message = Self::base(
            provisional_id("stream", now),
            thread_id,
            content,
            MessageRole::Agent,
            now,
        );
        message.is_streaming = true;
        message
    }
    
    /// Finalized message as confirmed by the server
    pub fn finalized(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        content: impl Into<String>,
        role: MessageRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::base(id.into(), thread_id, content, role, created_at)
    }
    
    pub fn is_pending(&self) -> bool {
        self.send_state == Some(SendState::Pending)
    }
    
    pub fn has_failed(&self) -> bool {
        self.send_state == Some(SendState::Failed)
    }
    
    pub fn author_id(&self) -> Option<&str> {
        self.metadata.user_id.as_deref()
    }
    
    /// Content prepared for display. Streaming snapshots are shown verbatim.
    pub fn display_content(&self) -> String {
        if self.is_streaming {
            return self.content.clone();
        }
        clean_content(&self.content)
    }
}

/// Client-generated id in the `<prefix>-<millis>-<suffix>` shape
pub fn provisional_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, now.timestamp_millis(), &suffix[..8])
}

/// Strip agent scaffolding from finalized content.
///
/// JSON-encoded user payloads are unwrapped to their `content` field, a
/// `Final Answer:` section wins over everything else, and ReAct-style
/// `Thought:` / `Action:` lines are dropped. Falls back to the raw content
/// when cleaning would leave nothing.
pub fn clean_content(content: &str) -> String {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') && trimmed.contains("content") {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(Value::String(inner)) = map.get("content") {
                return inner.clone();
            }
        }
    }
    
    if let Some(idx) = content.find(FINAL_ANSWER_MARKER) {
        return content[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string();
    }
    
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !SCAFFOLD_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
                && !(line.starts_with('{') && line.trim_end().ends_with('}'))
        })
        .collect();
    
    let cleaned = kept.join("\n");
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_prefix("Human:").unwrap_or(cleaned).trim();
    
    if cleaned.is_empty() {
        content.to_string()
    } else {
        cleaned.to_string()
    }
}
