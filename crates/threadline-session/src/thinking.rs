use std::time::Duration;

use tokio::time::Instant;

/// Derived "agent is thinking" signal with a trailing linger after `complete`
#[derive(Debug, Clone)]
pub struct ThinkingSignal {
    linger: Duration,
    awaiting_reply: bool,
    settles_at: Option<Instant>,
}

impl ThinkingSignal {
    pub fn new(linger: Duration) -> Self {
        Self {
            linger,
            awaiting_reply: false,
            settles_at: None,
        }
    }

    pub fn on_send(&mut self) {
        self.awaiting_reply = true;
        self.settles_at = None;
    }

    pub fn on_stream(&mut self) {
        self.settles_at = None;
    }

    pub fn on_complete(&mut self, now: Instant) {
        self.awaiting_reply = false;
        self.settles_at = Some(now + self.linger);
    }

    /// Errors and disconnects turn the signal off immediately
    pub fn clear(&mut self) {
        self.awaiting_reply = false;
        self.settles_at = None;
    }

    pub fn is_thinking(&self, has_streaming: bool, now: Instant) -> bool {
        if has_streaming || self.awaiting_reply {
            return true;
        }
        self.settles_at.map(|at| now < at).unwrap_or(false)
    }

    /// When the linger runs out, if one is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.settles_at
    }

    /// Drop an elapsed linger
    pub fn expire(&mut self, now: Instant) {
        if self.settles_at.map(|at| now >= at).unwrap_or(false) {
            self.settles_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linger_after_complete() {
        let mut signal = ThinkingSignal::new(Duration::from_millis(200));
        let start = Instant::now();
        assert!(!signal.is_thinking(false, start));

        signal.on_send();
        assert!(signal.is_thinking(false, start));

        signal.on_complete(start);
        assert!(signal.is_thinking(false, start + Duration::from_millis(150)));
        assert!(!signal.is_thinking(false, start + Duration::from_millis(200)));

        signal.expire(start + Duration::from_millis(250));
        assert!(signal.deadline().is_none());
    }

    #[test]
    fn test_streaming_keeps_thinking_on() {
        let mut signal = ThinkingSignal::new(Duration::from_millis(200));
        let start = Instant::now();
        signal.on_complete(start);
        signal.on_stream();
        assert!(signal.is_thinking(true, start + Duration::from_secs(5)));
        assert!(!signal.is_thinking(false, start + Duration::from_secs(5)));
    }

    #[test]
    fn test_clear_is_immediate() {
        let mut signal = ThinkingSignal::new(Duration::from_millis(200));
        let start = Instant::now();
        signal.on_send();
        signal.clear();
        assert!(!signal.is_thinking(false, start));
    }
}
