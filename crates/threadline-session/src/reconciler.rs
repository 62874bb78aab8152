use std::collections::HashSet;

use chrono::{DateTime, Utc};
use threadline_types::message::provisional_id;
use threadline_types::{InboundEvent, Message, MessageRole, ParticipantRole, SendState};

/// Input to the message reducer
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// Cumulative snapshot of the agent response
    Stream { content: String },
    Complete {
        id: Option<String>,
        content: String,
        created_at: Option<DateTime<Utc>>,
    },
    /// Message echoed by the server for any participant
    Remote {
        id: Option<String>,
        client_id: Option<String>,
        user_id: String,
        content: String,
        role: MessageRole,
        user_role: Option<ParticipantRole>,
        timestamp: Option<DateTime<Utc>>,
    },
    /// Optimistic message created by the local user
    LocalSend(Message),
    MarkPending { id: String },
    MarkSent { id: String },
    MarkFailed { id: String },
}

impl ReconcileEvent {
    /// Message-bearing inbound events; presence and control events map to `None`
    pub fn from_inbound(event: InboundEvent) -> Option<Self> {
        match event {
            InboundEvent::Stream { content } => Some(ReconcileEvent::Stream { content }),
            InboundEvent::Complete { id, content, created_at } => {
                Some(ReconcileEvent::Complete { id, content, created_at })
            }
            InboundEvent::Message {
                id,
                client_id,
                user_id,
                content,
                role,
                user_role,
                timestamp,
            } => Some(ReconcileEvent::Remote {
                id,
                client_id,
                user_id,
                content,
                role,
                user_role,
                timestamp,
            }),
            _ => None,
        }
    }
}

/// Pure reducer folding stream, complete, echo and local events into one
/// ordered list.
///
/// The output is always sorted by `created_at` (ties keep arrival order), has
/// at most one streaming element and never contains a finalized message with
/// blank content. `apply` never mutates its input.
#[derive(Debug, Clone)]
pub struct MessageReconciler {
    thread_id: String,
    local_user_id: String,
}

impl MessageReconciler {
    pub fn new(thread_id: impl Into<String>, local_user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            local_user_id: local_user_id.into(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn apply(&self, current: &[Message], event: ReconcileEvent, now: DateTime<Utc>) -> Vec<Message> {
        let mut messages = current.to_vec();

        match event {
            ReconcileEvent::Stream { content } => self.on_stream(&mut messages, content, now),
            ReconcileEvent::Complete { id, content, created_at } => {
                self.on_complete(&mut messages, id, content, created_at.unwrap_or(now), now)
            }
            ReconcileEvent::Remote {
                id,
                client_id,
                user_id,
                content,
                role,
                user_role,
                timestamp,
            } => {
                let echo = Echo {
                    id,
                    client_id,
                    user_id,
                    content,
                    role,
                    user_role,
                    created_at: timestamp.unwrap_or(now),
                };
                self.on_remote(&mut messages, echo, now)
            }
            ReconcileEvent::LocalSend(mut message) => {
                if !message.content.trim().is_empty() {
                    message.is_streaming = false;
                    insert_sorted(&mut messages, message);
                }
            }
            ReconcileEvent::MarkPending { id } => set_send_state(&mut messages, &id, SendState::Pending),
            ReconcileEvent::MarkSent { id } => set_send_state(&mut messages, &id, SendState::Sent),
            ReconcileEvent::MarkFailed { id } => set_send_state(&mut messages, &id, SendState::Failed),
        }

        messages
    }

    fn on_stream(&self, messages: &mut Vec<Message>, content: String, now: DateTime<Utc>) {
        if content.trim().is_empty() {
            return;
        }

        // Snapshots supersede each other; the placeholder may not be last once
        // a later remote message was sorted in after it
        if let Some(streaming) = messages.iter_mut().find(|m| m.is_streaming) {
            streaming.content = content;
            return;
        }

        insert_sorted(messages, Message::streaming_placeholder(&self.thread_id, content, now));
    }

    fn on_complete(
        &self,
        messages: &mut Vec<Message>,
        id: Option<String>,
        content: String,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        messages.retain(|m| !m.is_streaming);

        if content.trim().is_empty() {
            return;
        }

        if let Some(id) = &id {
            if let Some(existing) = messages.iter_mut().find(|m| &m.id == id) {
                existing.content = content;
                return;
            }
        }

        let id = id.unwrap_or_else(|| provisional_id("msg", now));
        insert_sorted(
            messages,
            Message::finalized(id, &self.thread_id, content, MessageRole::Agent, created_at),
        );
    }

    fn on_remote(&self, messages: &mut Vec<Message>, echo: Echo, now: DateTime<Utc>) {
        // Exact reconciliation of our own optimistic message
        if let Some(client_id) = &echo.client_id {
            if let Some(local) = messages.iter_mut().find(|m| &m.id == client_id) {
                if let Some(id) = echo.id {
                    local.id = id;
                }
                local.send_state = Some(SendState::Sent);
                return;
            }
        }

        if let Some(id) = &echo.id {
            if messages.iter().any(|m| &m.id == id) {
                return;
            }
        }

        if echo.client_id.is_none() && echo.user_id == self.local_user_id {
            // Already shown optimistically; confirm the oldest matching pending copy
            if let Some(local) = messages
                .iter_mut()
                .find(|m| m.is_pending() && m.content == echo.content)
            {
                local.send_state = Some(SendState::Sent);
            }
            return;
        }

        if echo.content.trim().is_empty() {
            return;
        }

        let id = echo.id.unwrap_or_else(|| provisional_id("msg", now));
        let mut message = Message::finalized(id, &self.thread_id, echo.content, echo.role, echo.created_at);
        message.metadata.user_id = Some(echo.user_id);
        message.metadata.user_role = echo.user_role;
        insert_sorted(messages, message);
    }

    /// Merge fetched history with the live list by id.
    ///
    /// History wins for ids present in both; live-only messages (optimistic,
    /// streaming, or received after the history snapshot) are kept.
    pub fn merge_history(&self, current: &[Message], history: Vec<Message>) -> Vec<Message> {
        let mut merged: Vec<Message> = Vec::with_capacity(history.len() + current.len());
        let mut seen = HashSet::new();

        for mut message in history {
            if message.content.trim().is_empty() || !seen.insert(message.id.clone()) {
                continue;
            }
            message.is_streaming = false;
            insert_sorted(&mut merged, message);
        }

        for message in current {
            if !seen.contains(&message.id) {
                insert_sorted(&mut merged, message.clone());
            }
        }

        merged
    }
}

struct Echo {
    id: Option<String>,
    client_id: Option<String>,
    user_id: String,
    content: String,
    role: MessageRole,
    user_role: Option<ParticipantRole>,
    created_at: DateTime<Utc>,
}

/// Insert after every element with `created_at <= message.created_at`
fn insert_sorted(messages: &mut Vec<Message>, message: Message) {
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(at, message);
}

fn set_send_state(messages: &mut [Message], id: &str, state: SendState) {
    if let Some(message) = messages.iter_mut().find(|m| m.id == id && m.send_state.is_some()) {
        message.send_state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reconciler() -> MessageReconciler {
        MessageReconciler::new("t1", "u1")
    }

    fn stream(content: &str) -> ReconcileEvent {
        ReconcileEvent::Stream { content: content.to_string() }
    }

    fn complete(content: &str) -> ReconcileEvent {
        ReconcileEvent::Complete {
            id: None,
            content: content.to_string(),
            created_at: None,
        }
    }

    fn remote(user_id: &str, content: &str, client_id: Option<&str>) -> ReconcileEvent {
        ReconcileEvent::Remote {
            id: Some(format!("srv-{}", content)),
            client_id: client_id.map(str::to_string),
            user_id: user_id.to_string(),
            content: content.to_string(),
            role: MessageRole::User,
            user_role: Some(ParticipantRole::Contributor),
            timestamp: None,
        }
    }

    fn fold(events: Vec<ReconcileEvent>) -> Vec<Message> {
        let r = reconciler();
        let now = Utc::now();
        events
            .into_iter()
            .enumerate()
            .fold(Vec::new(), |list, (i, event)| r.apply(&list, event, now + Duration::milliseconds(i as i64)))
    }

    #[test]
    fn test_stream_snapshots_collapse_into_one_message() {
        let list = fold(vec![stream("a"), stream("ab"), stream("abc"), complete("abc")]);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].content, "abc");
        assert!(!list[0].is_streaming);
        assert_eq!(list[0].role, MessageRole::Agent);
    }

    #[test]
    fn test_stream_replaces_not_concatenates() {
        let list = fold(vec![stream("He"), stream("Hello!")]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].content, "Hello!");
        assert!(list[0].is_streaming);
    }

    #[test]
    fn test_blank_stream_and_complete_are_dropped() {
        let list = fold(vec![stream("   "), complete("")]);
        assert!(list.is_empty());

        let list = fold(vec![stream("partial"), complete("  ")]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_complete_uses_server_id() {
        let r = reconciler();
        let list = r.apply(
            &[],
            ReconcileEvent::Complete {
                id: Some("m-42".to_string()),
                content: "done".to_string(),
                created_at: None,
            },
            Utc::now(),
        );
        assert_eq!(list[0].id, "m-42");

        // A repeated complete for the same id does not duplicate
        let again = r.apply(
            &list,
            ReconcileEvent::Complete {
                id: Some("m-42".to_string()),
                content: "done!".to_string(),
                created_at: None,
            },
            Utc::now(),
        );
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].content, "done!");
    }

    #[test]
    fn test_self_echo_without_client_id_is_suppressed() {
        let r = reconciler();
        let now = Utc::now();
        let local = Message::optimistic("t1", "hi", "u1", Some(ParticipantRole::Contributor), now);

        let list = r.apply(&[], ReconcileEvent::LocalSend(local), now);
        let list = r.apply(&list, remote("u1", "hi", None), now);

        assert_eq!(list.iter().filter(|m| m.content == "hi").count(), 1);
        assert_eq!(list[0].send_state, Some(SendState::Sent));
    }

    #[test]
    fn test_echo_with_client_id_confirms_local_message() {
        let r = reconciler();
        let now = Utc::now();
        let local = Message::optimistic("t1", "hi", "u1", None, now);
        let provisional = local.id.clone();

        let list = r.apply(&[], ReconcileEvent::LocalSend(local), now);
        let list = r.apply(&list, remote("u1", "hi", Some(&provisional)), now);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "srv-hi");
        assert_eq!(list[0].send_state, Some(SendState::Sent));
    }

    #[test]
    fn test_echo_from_other_device_is_appended() {
        let r = reconciler();
        let list = r.apply(&[], remote("u1", "from phone", Some("user-1-abcdef12")), Utc::now());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].author_id(), Some("u1"));
    }

    #[test]
    fn test_other_participant_message_is_appended_once() {
        let r = reconciler();
        let now = Utc::now();
        let list = r.apply(&[], remote("u2", "hello all", None), now);
        let list = r.apply(&list, remote("u2", "hello all", None), now);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].metadata.user_role, Some(ParticipantRole::Contributor));
    }

    #[test]
    fn test_stream_updates_placeholder_that_is_not_last() {
        let r = reconciler();
        let now = Utc::now();
        let list = r.apply(&[], stream("thinking"), now);

        let later = ReconcileEvent::Remote {
            id: Some("m-2".to_string()),
            client_id: None,
            user_id: "u2".to_string(),
            content: "interjection".to_string(),
            role: MessageRole::User,
            user_role: None,
            timestamp: Some(now + Duration::seconds(1)),
        };
        let list = r.apply(&list, later, now);
        let list = r.apply(&list, stream("thinking harder"), now + Duration::seconds(2));

        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().filter(|m| m.is_streaming).count(), 1);
        assert_eq!(list[0].content, "thinking harder");
    }

    #[test]
    fn test_sorted_insertion_is_stable_for_ties() {
        let r = reconciler();
        let now = Utc::now();
        let first = Message::finalized("a", "t1", "first", MessageRole::User, now);
        let second = Message::finalized("b", "t1", "second", MessageRole::User, now);
        let earlier = Message::finalized("c", "t1", "earlier", MessageRole::User, now - Duration::seconds(5));

        let list = r.apply(&[], ReconcileEvent::LocalSend(first), now);
        let list = r.apply(&list, ReconcileEvent::LocalSend(second), now);
        let list = r.apply(&list, ReconcileEvent::LocalSend(earlier), now);

        let ids: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_mark_failed_only_touches_local_messages() {
        let r = reconciler();
        let now = Utc::now();
        let local = Message::optimistic("t1", "hi", "u1", None, now);
        let id = local.id.clone();

        let list = r.apply(&[], ReconcileEvent::LocalSend(local), now);
        let list = r.apply(&list, ReconcileEvent::MarkFailed { id: id.clone() }, now);
        assert!(list[0].has_failed());

        let list = r.apply(&list, complete("reply"), now);
        let agent_id = list[1].id.clone();
        let list = r.apply(&list, ReconcileEvent::MarkFailed { id: agent_id }, now);
        assert_eq!(list[1].send_state, None);
    }

    #[test]
    fn test_merge_history_keeps_live_messages() {
        let r = reconciler();
        let now = Utc::now();
        let live = vec![
            Message::finalized("m1", "t1", "old copy", MessageRole::User, now - Duration::seconds(10)),
            Message::optimistic("t1", "just sent", "u1", None, now),
        ];
        let history = vec![
            Message::finalized("m0", "t1", "oldest", MessageRole::Agent, now - Duration::seconds(20)),
            Message::finalized("m1", "t1", "server copy", MessageRole::User, now - Duration::seconds(10)),
        ];

        let merged = r.merge_history(&live, history);

        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["oldest", "server copy", "just sent"]);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let r = reconciler();
        let list = r.apply(&[], stream("a"), Utc::now());
        let before = list.clone();
        let _ = r.apply(&list, complete("a"), Utc::now());
        assert_eq!(list, before);
    }
}
