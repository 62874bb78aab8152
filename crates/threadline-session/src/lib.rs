//! # threadline-session
//!
//! The thread session controller: the single object a UI drives to list and
//! open threads, send messages, and observe the live conversation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadline_persist::PersistClientBuilder;
//! use threadline_session::{SessionAuth, ThreadSession};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let persistence = PersistClientBuilder::new()
//!     .base_url("http://localhost:8000")
//!     .build()?;
//!
//! let (mut session, _notices) = ThreadSession::builder()
//!     .persistence(Arc::new(persistence))
//!     .auth(SessionAuth::new("user-1", "access-token"))
//!     .build()?;
//!
//! session.open_thread("thread-1").await?;
//! while let Some(update) = session.next_update().await {
//!     println!("{:?}", update);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod notice;
mod operations;
pub mod presence;
pub mod reconciler;
pub mod thinking;

pub use builder::ThreadSessionBuilder;
pub use controller::{SessionAuth, SessionUpdate, SessionView, ThreadSession};
pub use error::{Result, SessionError};
pub use fetch::{PendingThreadFetch, PendingThreadsFetch, ThreadFetch, ThreadsFetch};
pub use notice::{Notice, NoticeLevel};
pub use presence::PresenceTracker;
pub use reconciler::{MessageReconciler, ReconcileEvent};
pub use thinking::ThinkingSignal;
