use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::machine::CloseCode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    Refused(String),
    
    #[error("Handshake rejected with HTTP status {0}")]
    Rejected(u16),
    
    #[error("I/O error: {0}")]
    Io(String),
    
    #[error("Link closed")]
    Closed,
}

/// One frame read from an open link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed(CloseCode),
}

/// Opens links to the realtime endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, TransportError>;
}

/// An open, full-duplex text link
#[async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    
    /// Next inbound frame. Must be cancel-safe: the driver races it against
    /// commands and drops the future when a command wins.
    async fn recv(&mut self) -> Frame;
    
    async fn close(&mut self, code: CloseCode);
}
