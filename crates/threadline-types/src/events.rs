use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::message::{MessageRole, MessageType};
use crate::thread::ParticipantRole;

/// Raw inbound frame as it travels over the wire.
///
/// Every field except `type` is optional; [`InboundEvent::try_from`] turns an
/// envelope into a closed set of validated variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Validated server event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Cumulative snapshot of the agent response being generated
    Stream {
        content: String,
    },
    
    /// Agent response finished
    Complete {
        id: Option<String>,
        content: String,
        created_at: Option<DateTime<Utc>>,
    },
    
    /// Echo of a participant's message
    Message {
        id: Option<String>,
        client_id: Option<String>,
        user_id: String,
        content: String,
        role: MessageRole,
        user_role: Option<ParticipantRole>,
        timestamp: Option<DateTime<Utc>>,
    },
    
    UserJoined {
        user_id: String,
        role: ParticipantRole,
    },
    
    UserLeft {
        user_id: String,
    },
    
    /// Server-side failure while handling the thread
    Error {
        message: String,
    },
    
    /// Authoritative role of the local user, pushed after connect
    ConnectionState {
        role: ParticipantRole,
    },
}

impl InboundEvent {
    /// Parse and validate one text frame
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedEvent(e.to_string()))?;
        Self::try_from(envelope)
    }
    
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::Complete { .. } => "complete",
            Self::Message { .. } => "message",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::Error { .. } => "error",
            Self::ConnectionState { .. } => "connection_state",
        }
    }
    
    /// Encode back into the wire shape (used by in-memory servers and tests)
    pub fn to_wire(&self) -> WireEnvelope {
        let mut envelope = WireEnvelope {
            event_type: self.kind().to_string(),
            ..WireEnvelope::default()
        };
        
        match self {
            Self::Stream { content } => {
                envelope.content = Some(content.clone());
            }
            Self::Complete { id, content, created_at } => {
                envelope.id = id.clone();
                envelope.content = Some(content.clone());
                envelope.created_at = created_at.map(|at| at.to_rfc3339());
            }
            Self::Message { id, client_id, user_id, content, role, user_role, timestamp } => {
                envelope.id = id.clone();
                envelope.client_id = client_id.clone();
                envelope.user_id = Some(user_id.clone());
                envelope.content = Some(content.clone());
                envelope.role = Some(match (role, user_role) {
                    (MessageRole::User, Some(author_role)) => author_role.as_str().to_string(),
                    (MessageRole::User, None) => "user".to_string(),
                    (MessageRole::Agent, _) => "agent".to_string(),
                    (MessageRole::System, _) => "system".to_string(),
                });
                envelope.timestamp = timestamp.map(|at| Value::String(at.to_rfc3339()));
            }
            Self::UserJoined { user_id, role } => {
                envelope.user_id = Some(user_id.clone());
                envelope.role = Some(role.as_str().to_string());
            }
            Self::UserLeft { user_id } => {
                envelope.user_id = Some(user_id.clone());
            }
            Self::Error { message } => {
                envelope.content = Some(message.clone());
            }
            Self::ConnectionState { role } => {
                envelope.role = Some(role.as_str().to_string());
            }
        }
        
        envelope
    }
    
    pub fn to_json(&self) -> String {
        // WireEnvelope only holds strings and JSON values
        serde_json::to_string(&self.to_wire()).unwrap_or_default()
    }
}

impl TryFrom<WireEnvelope> for InboundEvent {
    type Error = ProtocolError;
    
    fn try_from(envelope: WireEnvelope) -> Result<Self> {
        match envelope.event_type.as_str() {
            "stream" => Ok(InboundEvent::Stream {
                content: envelope.content.unwrap_or_default(),
            }),
            "complete" => Ok(InboundEvent::Complete {
                id: envelope.id.filter(|id| !id.is_empty()),
                content: envelope.content.unwrap_or_default(),
                created_at: envelope
                    .created_at
                    .as_deref()
                    .map(parse_rfc3339)
                    .transpose()?,
            }),
            "message" => {
                let user_id = envelope.user_id.ok_or(ProtocolError::MissingField {
                    event: "message",
                    field: "user_id",
                })?;
                let (role, user_role) = match envelope.role.as_deref() {
                    None => (MessageRole::User, None),
                    Some(raw) => parse_message_role(raw)?,
                };
                Ok(InboundEvent::Message {
                    id: envelope.id.filter(|id| !id.is_empty()),
                    client_id: envelope.client_id.filter(|id| !id.is_empty()),
                    user_id,
                    content: envelope.content.unwrap_or_default(),
                    role,
                    user_role,
                    timestamp: envelope.timestamp.as_ref().map(parse_timestamp).transpose()?,
                })
            }
            "user_joined" => Ok(InboundEvent::UserJoined {
                user_id: envelope.user_id.ok_or(ProtocolError::MissingField {
                    event: "user_joined",
                    field: "user_id",
                })?,
                role: required_participant_role("user_joined", envelope.role.as_deref())?,
            }),
            "user_left" => Ok(InboundEvent::UserLeft {
                user_id: envelope.user_id.ok_or(ProtocolError::MissingField {
                    event: "user_left",
                    field: "user_id",
                })?,
            }),
            "error" => Ok(InboundEvent::Error {
                message: envelope
                    .content
                    .unwrap_or_else(|| "Unknown server error".to_string()),
            }),
            "connection_state" => Ok(InboundEvent::ConnectionState {
                role: required_participant_role("connection_state", envelope.role.as_deref())?,
            }),
            other => Err(ProtocolError::UnknownEventType(other.to_string())),
        }
    }
}

/// Message echoes may carry either a message role or the author's
/// participant role; the latter implies a user-role message.
fn parse_message_role(raw: &str) -> Result<(MessageRole, Option<ParticipantRole>)> {
    if let Some(role) = MessageRole::parse(raw) {
        return Ok((role, None));
    }
    if let Some(author_role) = ParticipantRole::parse(raw) {
        return Ok((MessageRole::User, Some(author_role)));
    }
    Err(ProtocolError::MalformedEvent(format!("invalid role '{}'", raw)))
}

fn required_participant_role(event: &'static str, raw: Option<&str>) -> Result<ParticipantRole> {
    let raw = raw.ok_or(ProtocolError::MissingField { event, field: "role" })?;
    ParticipantRole::parse(raw)
        .ok_or_else(|| ProtocolError::MalformedEvent(format!("invalid participant role '{}'", raw)))
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| ProtocolError::MalformedEvent(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Timestamps arrive either as RFC 3339 strings or epoch milliseconds
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_rfc3339(raw),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| ProtocolError::MalformedEvent(format!("invalid timestamp {}", n))),
        other => Err(ProtocolError::MalformedEvent(format!("invalid timestamp {}", other))),
    }
}

/// Outbound send envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub thread_id: String,
    pub user_id: String,
    /// Provisional id of the optimistic message, echoed back for exact reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl OutboundMessage {
    pub fn text(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            client_id: None,
        }
    }
    
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn parses_stream_frame() {
        let event = InboundEvent::parse(r#"{"type":"stream","content":"He"}"#).unwrap();
        assert_eq!(event, InboundEvent::Stream { content: "He".to_string() });
    }
    
    #[test]
    fn complete_without_content_is_empty() {
        let event = InboundEvent::parse(r#"{"type":"complete"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Complete { id: None, content: String::new(), created_at: None }
        );
    }
    
    #[test]
    fn message_role_may_be_participant_role() {
        let event = InboundEvent::parse(
            r#"{"type":"message","user_id":"u2","content":"hi","role":"contributor","timestamp":1714557600000}"#,
        )
        .unwrap();
        
        match event {
            InboundEvent::Message { role, user_role, timestamp, .. } => {
                assert_eq!(role, MessageRole::User);
                assert_eq!(user_role, Some(ParticipantRole::Contributor));
                assert_eq!(timestamp.unwrap().timestamp_millis(), 1714557600000);
            }
            other => panic!("Expected Message variant, got {:?}", other),
        }
    }
    
    #[test]
    fn message_without_user_is_rejected() {
        let err = InboundEvent::parse(r#"{"type":"message","content":"hi"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField { event: "message", field: "user_id" });
    }
    
    #[test]
    fn unknown_type_is_rejected() {
        let err = InboundEvent::parse(r#"{"type":"typing"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEventType(t) if t == "typing"));
    }
    
    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            InboundEvent::parse("not json"),
            Err(ProtocolError::MalformedEvent(_))
        ));
        assert!(matches!(
            InboundEvent::parse(r#"{"type":"user_joined","user_id":"u1","role":"admin"}"#),
            Err(ProtocolError::MalformedEvent(_))
        ));
    }
    
    #[test]
    fn wire_encoding_is_accepted_by_parser() {
        let event = InboundEvent::Message {
            id: Some("m9".to_string()),
            client_id: Some("user-1-abc".to_string()),
            user_id: "u2".to_string(),
            content: "hello".to_string(),
            role: MessageRole::User,
            user_role: Some(ParticipantRole::Owner),
            timestamp: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
        };
        assert_eq!(InboundEvent::parse(&event.to_json()).unwrap(), event);
    }
    
    #[test]
    fn outbound_envelope_shape() {
        let msg = OutboundMessage::text("t1", "u1", "hello").with_client_id("user-1-abc");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "content": "hello",
                "type": "text",
                "thread_id": "t1",
                "user_id": "u1",
                "client_id": "user-1-abc"
            })
        );
    }
}
