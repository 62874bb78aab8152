use std::time::Duration;

use threadline_types::ConnectionConfig;

/// WebSocket close code as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// Server-side authorization rejection
    pub const AUTH_REJECTED: CloseCode = CloseCode(4003);

    /// Normal closure and authorization rejection never trigger a reconnect
    pub fn is_terminal(&self) -> bool {
        *self == Self::NORMAL || *self == Self::AUTH_REJECTED
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Backoff { attempt: u32, delay: Duration },
    Failed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// True while a (re)connect is in flight or scheduled
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Backoff { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Backoff { .. } => "backoff",
            ConnectionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    /// Manual connect request
    Connect,
    HandshakeSucceeded,
    HandshakeFailed,
    Closed(CloseCode),
    BackoffElapsed,
    /// The access token expired before a (re)connect could be attempted
    TokenExpired,
    /// The owning view went away
    Unmount,
}

/// Side effects the driver must carry out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    CloseTransport(CloseCode),
    ScheduleReconnect { attempt: u32, delay: Duration },
    EmitConnected,
    EmitDisconnected(CloseCode),
    EmitFailed { attempts: u32 },
    EmitAuthExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base: config.backoff_base(),
            factor: config.backoff_factor.max(1),
            cap: config.backoff_cap(),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based): `min(base * factor^(attempt-1), cap)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

/// Pure reconnect state machine.
///
/// Every failure (refused handshake or a non-terminal close) counts one
/// attempt. While `attempts <= max_attempts` the machine schedules a reconnect
/// with exponential backoff; past that it parks in `Failed` until a manual
/// [`ConnectionInput::Connect`]. A successful handshake resets the counter.
/// Inputs that make no sense for the current state are ignored.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: BackoffPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn apply(&mut self, input: ConnectionInput) -> Vec<Effect> {
        use ConnectionInput as In;
        use ConnectionState as St;

        match (self.state, input) {
            (St::Connecting | St::Open, In::Connect) => Vec::new(),
            (St::Idle | St::Failed | St::Backoff { .. }, In::Connect) => {
                if self.state == St::Failed {
                    self.attempts = 0;
                }
                self.state = St::Connecting;
                vec![Effect::OpenTransport]
            }

            (St::Connecting, In::HandshakeSucceeded) => {
                self.attempts = 0;
                self.state = St::Open;
                vec![Effect::EmitConnected]
            }
            (St::Connecting, In::HandshakeFailed) => self.fail(),
            (St::Connecting, In::Closed(code)) if code.is_terminal() => {
                self.reset();
                Vec::new()
            }
            (St::Connecting, In::Closed(_)) => self.fail(),

            (St::Open, In::Closed(code)) if code.is_terminal() => {
                self.reset();
                vec![Effect::EmitDisconnected(code)]
            }
            (St::Open, In::Closed(code)) => {
                let mut effects = vec![Effect::EmitDisconnected(code)];
                effects.extend(self.fail());
                effects
            }

            (St::Connecting, In::TokenExpired) => {
                self.reset();
                vec![Effect::EmitAuthExpired]
            }

            (St::Backoff { .. }, In::BackoffElapsed) => {
                self.state = St::Connecting;
                vec![Effect::OpenTransport]
            }

            (St::Open, In::Unmount) => {
                self.reset();
                vec![
                    Effect::CloseTransport(CloseCode::NORMAL),
                    Effect::EmitDisconnected(CloseCode::NORMAL),
                ]
            }
            (St::Connecting, In::Unmount) => {
                self.reset();
                vec![Effect::CloseTransport(CloseCode::NORMAL)]
            }
            (_, In::Unmount) => {
                self.reset();
                Vec::new()
            }

            // Stale input for this state
            _ => Vec::new(),
        }
    }

    fn fail(&mut self) -> Vec<Effect> {
        self.attempts += 1;

        if self.attempts <= self.policy.max_attempts {
            let delay = self.policy.delay_for(self.attempts);
            self.state = ConnectionState::Backoff {
                attempt: self.attempts,
                delay,
            };
            vec![Effect::ScheduleReconnect {
                attempt: self.attempts,
                delay,
            }]
        } else {
            self.state = ConnectionState::Failed;
            vec![Effect::EmitFailed {
                attempts: self.attempts,
            }]
        }
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.attempts = 0;
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
