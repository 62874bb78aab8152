use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::auth::AuthClient;
use crate::client::HttpPersistClient;
use crate::error::{PersistError, Result};
use crate::tokens::{MemoryTokenStore, TokenStore};

pub struct PersistClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    token_store: Option<Arc<dyn TokenStore>>,
}

impl PersistClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            token_store: None,
        }
    }
    
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
    
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }
    
    /// Build the shared auth client
    pub fn build_auth(self) -> Result<Arc<AuthClient>> {
        let base_url = self.base_url
            .ok_or_else(|| PersistError::Internal("base_url is required".to_string()))?;
        url::Url::parse(&base_url)
            .map_err(|e| PersistError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;
        
        let store = self.token_store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        
        Ok(Arc::new(AuthClient::new(http, base_url, store)))
    }
    
    pub fn build(self) -> Result<HttpPersistClient> {
        Ok(HttpPersistClient::new(self.build_auth()?))
    }
}

impl Default for PersistClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
