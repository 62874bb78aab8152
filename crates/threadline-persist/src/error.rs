use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    
    #[error("Request failed ({status}): {message}")]
    Status { status: u16, message: String },
    
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    
    /// Refresh was rejected or impossible; the stored tokens have been cleared
    #[error("Session expired, sign in again")]
    SessionExpired,
    
    #[error("Not found: {0}")]
    NotFound(String),
    
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    
    #[error("Authentication required")]
    AuthRequired,
    
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PersistError {
    /// True when the only way forward is a fresh sign-in
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, PersistError::SessionExpired | PersistError::AuthRequired)
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
