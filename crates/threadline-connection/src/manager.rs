use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use threadline_types::token::is_token_expired;
use threadline_types::{ConnectionConfig, InboundEvent, OutboundMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::error::{ConnectionError, Result};
use crate::machine::{BackoffPolicy, CloseCode, ConnectionInput, ConnectionMachine, ConnectionState, Effect};
use crate::transport::{Frame, Link, Transport};

/// Lifecycle and payload events emitted by a [`ConnectionManager`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { code: CloseCode },
    Reconnecting { attempt: u32, delay: Duration },
    /// Retries exhausted; only a manual connect leaves this state
    Failed { attempts: u32 },
    /// The access token expired; a new token (and a new manager) is needed
    AuthExpired,
    Inbound(InboundEvent),
}

/// What the realtime endpoint needs to admit a client to a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub thread_id: String,
    pub user_id: String,
    pub token: String,
}

impl ConnectParams {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.thread_id.is_empty() && !self.user_id.is_empty() && !self.token.is_empty()
    }

    /// `{base}/ws/chat/{thread_id}?token=..&user_id=..`
    pub fn url(&self, base: &str) -> Result<Url> {
        let mut url = Url::parse(base).map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| ConnectionError::InvalidUrl(format!("{} cannot be a base", base)))?
            .pop_if_empty()
            .extend(["ws", "chat", self.thread_id.as_str()]);

        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .append_pair("user_id", &self.user_id);

        Ok(url)
    }
}

enum Command {
    Connect,
    Send {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to the background task owning one thread's connection.
///
/// Dropping the handle closes the link with a normal close code.
pub struct ConnectionManager {
    params: ConnectParams,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    driver: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawn the driver task. The manager starts `Idle`; call [`connect`](Self::connect).
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: &ConnectionConfig,
        params: ConnectParams,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        let url = params.url(&config.ws_url)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let driver = Driver {
            machine: ConnectionMachine::new(BackoffPolicy::from_config(config)),
            transport,
            url,
            thread_id: params.thread_id.clone(),
            token: params.token.clone(),
            link: None,
            backoff_deadline: None,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
        };

        let handle = tokio::spawn(driver.run());

        Ok((
            Self {
                params,
                commands: command_tx,
                state: state_rx,
                driver: Some(handle),
            },
            event_rx,
        ))
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn thread_id(&self) -> &str {
        &self.params.thread_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Request a connection. Idempotent while connecting or open; from
    /// `Failed` it starts a fresh retry budget.
    pub fn connect(&self) -> Result<()> {
        if !self.params.is_complete() {
            return Err(ConnectionError::AuthRequired(
                "thread, user and token are all required".to_string(),
            ));
        }
        if is_token_expired(&self.params.token, Utc::now()) {
            return Err(ConnectionError::AuthRequired("access token has expired".to_string()));
        }

        self.commands
            .send(Command::Connect)
            .map_err(|_| ConnectionError::Closed)
    }

    /// Transmit one message. Fails with `NotConnected` unless the link is open.
    pub async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.state().is_open() {
            return Err(ConnectionError::NotConnected);
        }

        let text = serde_json::to_string(message)
            .map_err(|e| ConnectionError::Serialization(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send { text, reply: reply_tx })
            .map_err(|_| ConnectionError::Closed)?;

        reply_rx.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Close with a normal code and return to `Idle`
    pub async fn disconnect(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Close the link and wait for the driver task to finish
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.driver.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Connection driver ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

struct Driver {
    machine: ConnectionMachine,
    transport: Arc<dyn Transport>,
    url: Url,
    thread_id: String,
    token: String,
    link: Option<Box<dyn Link>>,
    backoff_deadline: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

enum OpenStep {
    Frame(Frame),
    Command(Option<Command>),
}

impl Driver {
    async fn run(mut self) {
        tracing::debug!(thread_id = %self.thread_id, "Connection driver started");

        loop {
            let keep_running = match self.machine.state() {
                ConnectionState::Idle | ConnectionState::Failed => self.wait_for_command().await,
                ConnectionState::Connecting => self.open_link().await,
                ConnectionState::Open => self.pump_open().await,
                ConnectionState::Backoff { .. } => self.wait_backoff().await,
            };

            if !keep_running {
                break;
            }
        }

        tracing::debug!(thread_id = %self.thread_id, "Connection driver stopped");
    }

    async fn apply(&mut self, input: ConnectionInput) {
        let effects = self.machine.apply(input);
        // Publish the new state before the events that describe it
        self.state.send_replace(self.machine.state());

        for effect in effects {
            match effect {
                // The run loop opens on entering `Connecting`
                Effect::OpenTransport => {}
                Effect::CloseTransport(code) => {
                    if let Some(mut link) = self.link.take() {
                        link.close(code).await;
                    }
                }
                Effect::ScheduleReconnect { attempt, delay } => {
                    tracing::info!(
                        thread_id = %self.thread_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );
                    self.backoff_deadline = Some(Instant::now() + delay);
                    self.emit(ConnectionEvent::Reconnecting { attempt, delay });
                }
                Effect::EmitConnected => {
                    tracing::info!(thread_id = %self.thread_id, "Connected");
                    self.emit(ConnectionEvent::Connected);
                }
                Effect::EmitDisconnected(code) => {
                    self.link = None;
                    tracing::info!(thread_id = %self.thread_id, code = code.0, "Disconnected");
                    self.emit(ConnectionEvent::Disconnected { code });
                }
                Effect::EmitFailed { attempts } => {
                    tracing::error!(thread_id = %self.thread_id, attempts, "Giving up on connection");
                    self.emit(ConnectionEvent::Failed { attempts });
                }
                Effect::EmitAuthExpired => {
                    tracing::warn!(thread_id = %self.thread_id, "Access token expired, not reconnecting");
                    self.emit(ConnectionEvent::AuthExpired);
                }
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // Nobody listening is fine; the state watch still reflects reality
        let _ = self.events.send(event);
    }

    /// Handle a command in any state without an open link
    async fn handle_offline_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => {
                self.apply(ConnectionInput::Connect).await;
                true
            }
            Command::Send { reply, .. } => {
                let _ = reply.send(Err(ConnectionError::NotConnected));
                true
            }
            Command::Disconnect { done } => {
                self.apply(ConnectionInput::Unmount).await;
                let _ = done.send(());
                true
            }
            Command::Shutdown => {
                self.apply(ConnectionInput::Unmount).await;
                false
            }
        }
    }

    async fn wait_for_command(&mut self) -> bool {
        match self.commands.recv().await {
            Some(command) => self.handle_offline_command(command).await,
            None => false,
        }
    }

    async fn open_link(&mut self) -> bool {
        // Retries reuse the token baked into the url
        if is_token_expired(&self.token, Utc::now()) {
            self.apply(ConnectionInput::TokenExpired).await;
            return true;
        }

        tracing::debug!(thread_id = %self.thread_id, "Opening connection");

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let mut open = transport.open(&url);

        loop {
            tokio::select! {
                result = &mut open => {
                    match result {
                        Ok(link) => {
                            self.link = Some(link);
                            self.apply(ConnectionInput::HandshakeSucceeded).await;
                        }
                        Err(e) => {
                            tracing::warn!(thread_id = %self.thread_id, error = %e, "Connection attempt failed");
                            self.apply(ConnectionInput::HandshakeFailed).await;
                        }
                    }
                    return true;
                }
                command = self.commands.recv() => match command {
                    // Already connecting
                    Some(Command::Connect) => {}
                    // Keep the handshake in flight
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(ConnectionError::NotConnected));
                    }
                    Some(command) => return self.handle_offline_command(command).await,
                    None => {
                        self.apply(ConnectionInput::Unmount).await;
                        return false;
                    }
                }
            }
        }
    }

    async fn pump_open(&mut self) -> bool {
        let step = match self.link.as_mut() {
            Some(link) => tokio::select! {
                frame = link.recv() => OpenStep::Frame(frame),
                command = self.commands.recv() => OpenStep::Command(command),
            },
            None => OpenStep::Frame(Frame::Closed(CloseCode::ABNORMAL)),
        };

        match step {
            OpenStep::Frame(Frame::Text(text)) => {
                self.dispatch(&text);
                true
            }
            OpenStep::Frame(Frame::Closed(code)) => {
                self.link = None;
                self.apply(ConnectionInput::Closed(code)).await;
                true
            }
            OpenStep::Command(Some(Command::Send { text, reply })) => {
                let result = match self.link.as_mut() {
                    Some(link) => link.send_text(text).await.map_err(ConnectionError::from),
                    None => Err(ConnectionError::NotConnected),
                };
                if let Err(e) = &result {
                    tracing::warn!(thread_id = %self.thread_id, error = %e, "Send failed");
                }
                let _ = reply.send(result);
                true
            }
            OpenStep::Command(Some(Command::Connect)) => true,
            OpenStep::Command(Some(command)) => self.handle_offline_command(command).await,
            OpenStep::Command(None) => {
                self.apply(ConnectionInput::Unmount).await;
                false
            }
        }
    }

    async fn wait_backoff(&mut self) -> bool {
        let deadline = self.backoff_deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                self.backoff_deadline = None;
                self.apply(ConnectionInput::BackoffElapsed).await;
                true
            }
            command = self.commands.recv() => match command {
                Some(command) => self.handle_offline_command(command).await,
                None => false,
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match InboundEvent::parse(text) {
            Ok(event) => {
                tracing::debug!(thread_id = %self.thread_id, kind = event.kind(), "Inbound event");
                self.emit(ConnectionEvent::Inbound(event));
            }
            Err(e) => {
                tracing::warn!(thread_id = %self.thread_id, error = %e, "Dropping malformed frame");
            }
        }
    }
}
