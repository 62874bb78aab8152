use thiserror::Error;

/// Errors raised while validating inbound frames at the transport boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
    
    #[error("Missing field '{field}' for '{event}' event")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
