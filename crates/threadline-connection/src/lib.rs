//! # threadline-connection
//!
//! Owns one live connection per mounted thread view. The reconnect logic is an
//! explicit state machine ([`ConnectionMachine`]) driven by a background task
//! ([`ConnectionManager`]); sockets are reached only through the [`Transport`]
//! trait so the whole lifecycle can run against [`MemoryTransport`] in tests.

pub mod error;
pub mod machine;
pub mod manager;
pub mod memory;
pub mod transport;
pub mod ws;

pub use error::{ConnectionError, Result};
pub use machine::{BackoffPolicy, CloseCode, ConnectionInput, ConnectionMachine, ConnectionState, Effect};
pub use manager::{ConnectParams, ConnectionEvent, ConnectionManager};
pub use memory::{ClientFrame, MemoryServer, MemoryTransport, ServerConnection};
pub use transport::{Frame, Link, Transport, TransportError};
pub use ws::WsTransport;
