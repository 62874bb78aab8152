use std::sync::RwLock;

use crate::models::AuthTokens;

/// Where the access/refresh pair lives between requests
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<AuthTokens>;
    
    fn save(&self, tokens: AuthTokens);
    
    fn clear(&self);
    
    fn access_token(&self) -> Option<String> {
        self.load().map(|tokens| tokens.access_token)
    }
    
    fn refresh_token(&self) -> Option<String> {
        self.load().map(|tokens| tokens.refresh_token)
    }
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<AuthTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<AuthTokens> {
        self.tokens.read().ok().and_then(|guard| guard.clone())
    }
    
    fn save(&self, tokens: AuthTokens) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = Some(tokens);
        }
    }
    
    fn clear(&self) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_save_load_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.access_token().is_none());
        
        store.save(AuthTokens {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
        });
        assert_eq!(store.access_token().as_deref(), Some("a"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
        
        store.clear();
        assert!(store.load().is_none());
    }
}
