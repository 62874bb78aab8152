pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod thread;
pub mod token;

pub use config::{ConnectionConfig, SessionConfig};
pub use error::{ProtocolError, Result};
pub use events::{InboundEvent, OutboundMessage, WireEnvelope};
pub use message::{Message, MessageMetadata, MessageRole, MessageType, SendState};
pub use thread::{
    ParticipantRole, ParticipantUpdate, Thread, ThreadAccess, ThreadListParams, ThreadParticipant,
    ThreadShare, ThreadShareResponse, ThreadStatus, ThreadUpdate, MessageListParams,
};
