use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// A user's relationship to a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Contributor,
    Viewer,
}

impl ParticipantRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "contributor" => Some(Self::Contributor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
    
    /// Viewers may never author user-role messages
    pub fn can_author(&self) -> bool {
        !matches!(self, Self::Viewer)
    }
    
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Contributor => "contributor",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Active,
    Paused,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadParticipant {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub role: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, rename = "last_accessed_at", skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl ThreadParticipant {
    pub fn new(user_id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            thread_id: None,
            role,
            email: None,
            share_id: None,
            is_active: true,
            last_active_at: None,
        }
    }
    
    pub fn with_last_active(mut self, at: DateTime<Utc>) -> Self {
        self.last_active_at = Some(at);
        self
    }
}

/// Session-local projection of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<ThreadParticipant>,
    /// Badge role derived from the participant list; never used to gate sends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<ParticipantRole>,
    #[serde(default)]
    pub thread_metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Thread {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            title: title.into(),
            status: ThreadStatus::Active,
            messages: Vec::new(),
            message_count: 0,
            last_message_at: None,
            participants: Vec::new(),
            user_role: None,
            thread_metadata: Value::Null,
            created_at: None,
            updated_at: None,
        }
    }
    
    /// Replace the live message list and recompute the derived counters
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.message_count = messages.iter().filter(|m| !m.is_streaming).count();
        self.last_message_at = messages.last().map(|m| m.created_at);
        self.messages = messages;
    }
    
    /// Role badge for `user_id`: their active participant entry, else owner
    /// when they created the thread, else viewer.
    pub fn derive_user_role(&self, user_id: &str) -> ParticipantRole {
        if let Some(participant) = self
            .participants
            .iter()
            .find(|p| p.user_id == user_id && p.is_active)
        {
            return participant.role;
        }
        if self.user_id == user_id {
            return ParticipantRole::Owner;
        }
        ParticipantRole::Viewer
    }
    
    /// Copy the fields of an updated thread record, keeping local messages
    pub fn apply_update(&mut self, updated: Thread) {
        self.title = updated.title;
        self.status = updated.status;
        self.thread_metadata = updated.thread_metadata;
        self.updated_at = updated.updated_at.or(self.updated_at);
        if !updated.participants.is_empty() {
            self.participants = updated.participants;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreadListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ThreadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl ThreadListParams {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn with_status(mut self, status: ThreadStatus) -> Self {
        self.status = Some(status);
        self
    }
    
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
    
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ThreadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadShare {
    pub email: String,
    pub role: ParticipantRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThreadShareResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub share_id: String,
    #[serde(default)]
    pub participant: Option<ThreadParticipant>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThreadAccess {
    pub thread: Thread,
    pub role: ParticipantRole,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub access_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantUpdate {
    pub role: ParticipantRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ParticipantUpdate {
    pub fn role(role: ParticipantRole) -> Self {
        Self {
            role,
            share_expires_at: None,
            is_active: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;
    
    #[test]
    fn set_messages_counts_only_finalized() {
        let now = Utc::now();
        let mut thread = Thread::new("t1", "Planning");
        thread.set_messages(vec![
            Message::finalized("m1", "t1", "hello", MessageRole::User, now),
            Message::streaming_placeholder("t1", "thinking", now),
        ]);
        
        assert_eq!(thread.message_count, 1);
        assert_eq!(thread.last_message_at, Some(now));
        assert_eq!(thread.messages.len(), 2);
    }
    
    #[test]
    fn clearing_messages_clears_last_message_time() {
        let mut thread = Thread::new("t1", "Planning");
        thread.set_messages(vec![Message::finalized("m1", "t1", "hello", MessageRole::User, Utc::now())]);
        assert!(thread.last_message_at.is_some());
        
        thread.set_messages(Vec::new());
        assert_eq!(thread.message_count, 0);
        assert_eq!(thread.last_message_at, None);
    }
    
    #[test]
    fn derive_role_prefers_active_participant_entry() {
        let mut thread = Thread::new("t1", "Shared");
        thread.user_id = "owner-1".to_string();
        thread.participants = vec![
            ThreadParticipant::new("u2", ParticipantRole::Contributor),
            ThreadParticipant {
                is_active: false,
                ..ThreadParticipant::new("u3", ParticipantRole::Contributor)
            },
        ];
        
        assert_eq!(thread.derive_user_role("u2"), ParticipantRole::Contributor);
        assert_eq!(thread.derive_user_role("owner-1"), ParticipantRole::Owner);
        assert_eq!(thread.derive_user_role("u3"), ParticipantRole::Viewer);
        assert_eq!(thread.derive_user_role("stranger"), ParticipantRole::Viewer);
    }
    
    #[test]
    fn viewer_cannot_author() {
        assert!(ParticipantRole::Owner.can_author());
        assert!(ParticipantRole::Contributor.can_author());
        assert!(!ParticipantRole::Viewer.can_author());
    }
    
    #[test]
    fn thread_list_params_skip_unset_fields() {
        let params = ThreadListParams::new().with_limit(20);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"limit": 20}));
    }
}
