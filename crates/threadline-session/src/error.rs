use std::time::Duration;

use thiserror::Error;
use threadline_connection::ConnectionError;
use threadline_persist::PersistError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    
    #[error("Connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },
    
    #[error("Authentication required")]
    AuthRequired,
    
    #[error("Message was not transmitted within {0:?}")]
    SendTimeout(Duration),
    
    #[error("Message content is empty")]
    EmptyMessage,
    
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    
    #[error("Invalid session configuration: {0}")]
    Config(String),
    
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
    
    #[error("Connection error: {0}")]
    Connection(ConnectionError),
}

impl From<ConnectionError> for SessionError {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::NotConnected => SessionError::NotConnected,
            ConnectionError::AuthRequired(_) => SessionError::AuthRequired,
            other => SessionError::Connection(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
