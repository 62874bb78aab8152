use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use threadline_types::{InboundEvent, OutboundMessage};
use tokio::sync::mpsc;
use url::Url;

use crate::machine::CloseCode;
use crate::transport::{Frame, Link, Transport, TransportError};

/// Frame sent by the client side of an in-memory link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close(CloseCode),
}

struct MemoryState {
    accepted: mpsc::UnboundedSender<ServerConnection>,
    refuse_next: u32,
    opened: Vec<Url>,
}

/// In-process [`Transport`] for tests and demos.
///
/// Every successful `open` hands a [`ServerConnection`] to the paired
/// [`MemoryServer`], which plays the backend.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MemoryState {
                accepted: accepted_tx,
                refuse_next: 0,
                opened: Vec::new(),
            })),
        };
        (transport, MemoryServer { accepted: accepted_rx })
    }

    /// Refuse the next `count` open attempts
    pub fn refuse_next(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.refuse_next = count;
        }
    }

    /// Number of open attempts, refused ones included
    pub fn open_attempts(&self) -> usize {
        self.state.lock().map(|s| s.opened.len()).unwrap_or_default()
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.state.lock().map(|s| s.opened.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, TransportError> {
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TransportError::Io("memory transport lock poisoned".to_string()))?;
            state.opened.push(url.clone());

            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                return Err(TransportError::Refused(url.to_string()));
            }

            let connection = ServerConnection {
                url: url.clone(),
                incoming: to_server_rx,
                outgoing: to_client_tx,
            };
            state
                .accepted
                .send(connection)
                .map_err(|_| TransportError::Refused("no server listening".to_string()))?;
        }

        Ok(Box::new(MemoryLink {
            outgoing: to_server_tx,
            incoming: to_client_rx,
        }))
    }
}

struct MemoryLink {
    outgoing: mpsc::UnboundedSender<ClientFrame>,
    incoming: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(ClientFrame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Frame {
        // A dropped server end looks like a dead socket
        self.incoming
            .recv()
            .await
            .unwrap_or(Frame::Closed(CloseCode::ABNORMAL))
    }

    async fn close(&mut self, code: CloseCode) {
        let _ = self.outgoing.send(ClientFrame::Close(code));
        self.incoming.close();
    }
}

/// Accepts in-memory connections
pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MemoryServer {
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accepted.recv().await
    }

    pub fn try_accept(&mut self) -> Option<ServerConnection> {
        self.accepted.try_recv().ok()
    }
}

/// Backend half of one in-memory link
pub struct ServerConnection {
    url: Url,
    incoming: mpsc::UnboundedReceiver<ClientFrame>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl ServerConnection {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Push an event to the client. Returns false if the client is gone.
    pub fn push(&self, event: &InboundEvent) -> bool {
        self.push_raw(event.to_json())
    }

    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Frame::Text(text.into())).is_ok()
    }

    pub fn close(&self, code: CloseCode) -> bool {
        self.outgoing.send(Frame::Closed(code)).is_ok()
    }

    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.incoming.recv().await
    }

    /// Next outbound chat message, skipping anything that does not parse
    pub async fn recv_message(&mut self) -> Option<OutboundMessage> {
        while let Some(frame) = self.incoming.recv().await {
            if let ClientFrame::Text(text) = frame {
                if let Ok(message) = serde_json::from_str(&text) {
                    return Some(message);
                }
            }
        }
        None
    }
}
