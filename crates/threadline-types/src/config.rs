use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and reconnect settings for one thread connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base WebSocket url, e.g. `ws://localhost:8080`
    pub ws_url: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: u32,
    pub backoff_cap_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080".to_string(),
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_factor: 2,
            backoff_cap_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }
    
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
    
    pub fn with_backoff(mut self, base: Duration, factor: u32, cap: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self.backoff_factor = factor;
        self.backoff_cap_ms = cap.as_millis() as u64;
        self
    }
    
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
    
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Settings for the thread session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Trailing delay before the "thinking" affordance turns off
    pub thinking_linger_ms: u64,
    /// Optimistic messages not transmitted within this window are marked failed
    pub send_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thinking_linger_ms: 200,
            send_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn with_thinking_linger(mut self, linger: Duration) -> Self {
        self.thinking_linger_ms = linger.as_millis() as u64;
        self
    }
    
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }
    
    pub fn thinking_linger(&self) -> Duration {
        Duration::from_millis(self.thinking_linger_ms)
    }
    
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
