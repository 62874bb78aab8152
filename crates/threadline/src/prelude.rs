//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use threadline::prelude::*;
//! ```

pub use crate::{
    ThreadSession, ThreadSessionBuilder, SessionAuth, SessionUpdate, SessionView, SessionError,
    Notice, NoticeLevel,
    ConnectionConfig, SessionConfig,
    Message, MessageRole, SendState, Thread, ThreadParticipant, ParticipantRole, ThreadListParams,
    ConnectionState, Transport, WsTransport, MemoryTransport,
    PersistenceClient, PersistClientBuilder, AuthClient, TokenStore, MemoryTokenStore,
};
