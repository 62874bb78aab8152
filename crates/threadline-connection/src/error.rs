use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Authentication required: {0}")]
    AuthRequired(String),
    
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),
    
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    
    #[error("Serialization error: {0}")]
    Serialization(String),
    
    #[error("Connection manager has shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
