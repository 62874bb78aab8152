//! # Threadline
//!
//! Client core for real-time, multi-participant conversations with an AI agent.
//!
//! ## Overview
//!
//! A UI talks to exactly one object, [`ThreadSession`]. It:
//!
//! - **Lists and manages threads** through a pluggable HTTP persistence client
//! - **Holds one live connection** per open thread, reconnecting with bounded backoff
//! - **Shows messages optimistically** and reconciles them with server echoes
//! - **Folds streamed agent output** into a single in-progress message
//! - **Tracks presence and the local role**, refusing sends from viewers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use threadline::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let persistence = PersistClientBuilder::new()
//!         .base_url("http://localhost:8000")
//!         .build()?;
//!     let tokens = persistence.auth().sign_in("me@example.com", "secret").await?;
//!
//!     let (mut session, _notices) = ThreadSession::builder()
//!         .persistence(Arc::new(persistence))
//!         .connection_config(ConnectionConfig::new("ws://localhost:8000"))
//!         .auth(SessionAuth::new("user-1", tokens.access_token))
//!         .build()?;
//!
//!     session.open_thread("thread-1").await?;
//!     session.wait_connected(Duration::from_secs(5)).await?;
//!     session.send_message("Hello!").await?;
//!
//!     while let Some(update) = session.next_update().await {
//!         if update == SessionUpdate::Messages {
//!             for message in session.messages() {
//!                 println!("{:?}: {}", message.role, message.display_content());
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`threadline-types`**: data model and the typed wire protocol
//! - **`threadline-connection`**: reconnect state machine, transports, connection manager
//! - **`threadline-persist`**: HTTP persistence and auth collaborators
//! - **`threadline-session`**: reconciler, presence, thinking signal and the session controller
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use threadline_types::{
    ConnectionConfig, SessionConfig,
    InboundEvent, OutboundMessage, ProtocolError,
    Message, MessageMetadata, MessageRole, MessageType, SendState,
    ParticipantRole, ParticipantUpdate, Thread, ThreadAccess, ThreadListParams, ThreadParticipant,
    ThreadShare, ThreadShareResponse, ThreadStatus, ThreadUpdate, MessageListParams,
};

pub use threadline_connection::{
    CloseCode, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState, ConnectParams,
    Transport, Link, WsTransport, MemoryTransport, MemoryServer, ServerConnection,
};

pub use threadline_persist::{
    PersistenceClient, HttpPersistClient, PersistClientBuilder, AuthClient, AuthTokens,
    TokenStore, MemoryTokenStore, InviteAcceptance, User, PersistError,
};

pub use threadline_session::{
    ThreadSession, ThreadSessionBuilder, SessionAuth, SessionUpdate, SessionView, SessionError,
    Notice, NoticeLevel, PresenceTracker, MessageReconciler, ReconcileEvent, ThinkingSignal,
};
