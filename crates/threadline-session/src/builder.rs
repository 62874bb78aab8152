use std::sync::Arc;

use threadline_connection::{Transport, WsTransport};
use threadline_persist::PersistenceClient;
use threadline_types::{ConnectionConfig, SessionConfig};
use tokio::sync::mpsc;

use crate::controller::{SessionAuth, ThreadSession};
use crate::error::{Result, SessionError};
use crate::notice::Notice;

/// Builder for [`ThreadSession`]. Only the persistence client is required;
/// the transport defaults to a real WebSocket.
pub struct ThreadSessionBuilder {
    transport: Option<Arc<dyn Transport>>,
    persistence: Option<Arc<dyn PersistenceClient>>,
    connection_config: ConnectionConfig,
    session_config: SessionConfig,
    auth: Option<SessionAuth>,
}

impl ThreadSessionBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            persistence: None,
            connection_config: ConnectionConfig::default(),
            session_config: SessionConfig::default(),
            auth: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceClient>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn auth(mut self, auth: SessionAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the session along with the receiving end of its notice channel
    pub fn build(self) -> Result<(ThreadSession, mpsc::UnboundedReceiver<Notice>)> {
        let persistence = self
            .persistence
            .ok_or_else(|| SessionError::Config("persistence client is required".to_string()))?;
        url::Url::parse(&self.connection_config.ws_url).map_err(|e| {
            SessionError::Config(format!("{}: {}", self.connection_config.ws_url, e))
        })?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new()));

        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let session = ThreadSession::new(
            transport,
            persistence,
            self.connection_config,
            self.session_config,
            self.auth,
            notices_tx,
        );
        Ok((session, notices_rx))
    }
}

impl Default for ThreadSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
