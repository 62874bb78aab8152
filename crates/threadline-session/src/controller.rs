use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use threadline_connection::{
    CloseCode, ConnectParams, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState,
    Transport,
};
use threadline_persist::{PersistError, PersistenceClient};
use threadline_types::{
    ConnectionConfig, InboundEvent, Message, OutboundMessage, ParticipantRole, SessionConfig,
    Thread, ThreadParticipant,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Result, SessionError};
use crate::notice::Notice;
use crate::presence::PresenceTracker;
use crate::reconciler::{MessageReconciler, ReconcileEvent};
use crate::thinking::ThinkingSignal;

/// Credentials the session acts under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAuth {
    pub user_id: String,
    pub token: String,
}

impl SessionAuth {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

/// What changed after one call to [`ThreadSession::next_update`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connection(ConnectionState),
    Messages,
    Presence,
    Thinking,
    ServerError(String),
}

/// Snapshot of everything a UI renders for the open thread
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub thread_id: Option<String>,
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub connection: ConnectionState,
    pub is_agent_thinking: bool,
    pub can_send: bool,
    pub local_role: ParticipantRole,
    pub input_placeholder: &'static str,
    pub participants: Vec<ThreadParticipant>,
    pub error: Option<String>,
}

pub(crate) struct ActiveThread {
    pub(crate) manager: ConnectionManager,
    pub(crate) events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub(crate) reconciler: MessageReconciler,
}

/// The one object a UI talks to.
///
/// Owns the thread list, the open thread and its live message list, and the
/// per-thread connection. Connection events are folded in by
/// [`next_update`](Self::next_update); nothing else mutates session state.
pub struct ThreadSession {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) persistence: Arc<dyn PersistenceClient>,
    pub(crate) connection_config: ConnectionConfig,
    pub(crate) config: SessionConfig,
    pub(crate) auth: Option<SessionAuth>,
    pub(crate) threads: Vec<Thread>,
    pub(crate) current_thread: Option<Thread>,
    pub(crate) active: Option<ActiveThread>,
    pub(crate) presence: PresenceTracker,
    pub(crate) thinking: ThinkingSignal,
    pub(crate) error: Option<String>,
    pub(crate) is_loading: bool,
    /// Bumped whenever the signed-in identity changes
    pub(crate) auth_epoch: u64,
    /// Bumped whenever the open thread changes
    pub(crate) thread_epoch: u64,
    link_up: bool,
    connection_failure: Option<u32>,
    token_expired: bool,
    notices: mpsc::UnboundedSender<Notice>,
}

impl ThreadSession {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        persistence: Arc<dyn PersistenceClient>,
        connection_config: ConnectionConfig,
        config: SessionConfig,
        auth: Option<SessionAuth>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        let thinking = ThinkingSignal::new(config.thinking_linger());
        Self {
            transport,
            persistence,
            connection_config,
            config,
            auth,
            threads: Vec::new(),
            current_thread: None,
            active: None,
            presence: PresenceTracker::new(),
            thinking,
            error: None,
            is_loading: false,
            auth_epoch: 0,
            thread_epoch: 0,
            link_up: false,
            connection_failure: None,
            token_expired: false,
            notices,
        }
    }

    /// Create a builder for fluent construction
    pub fn builder() -> crate::builder::ThreadSessionBuilder {
        crate::builder::ThreadSessionBuilder::new()
    }

    pub fn auth(&self) -> Option<&SessionAuth> {
        self.auth.as_ref()
    }

    pub(crate) fn require_auth(&self) -> Result<SessionAuth> {
        self.auth.clone().ok_or(SessionError::AuthRequired)
    }

    /// Switch identity. Losing auth (or changing user) clears all thread,
    /// message and participant state immediately; a refreshed token for the
    /// same user only reconnects the open thread.
    pub async fn set_auth(&mut self, auth: Option<SessionAuth>) {
        let Some(next) = auth else {
            self.reset_all().await;
            self.auth = None;
            return;
        };

        let same_user = self.auth.as_ref().is_some_and(|current| current.user_id == next.user_id);
        let same_token = self.auth.as_ref().is_some_and(|current| current.token == next.token);

        if !same_user {
            self.reset_all().await;
            self.auth = Some(next);
        } else if !same_token {
            self.auth = Some(next);
            self.reconnect_open_thread().await;
        }
    }

    /// Swap in a refreshed access token for the signed-in user. Returns
    /// `true` when the token changed, in which case the open thread has been
    /// reconnected with it.
    pub async fn replace_token(&mut self, token: impl Into<String>) -> Result<bool> {
        let current = self.require_auth()?;
        let token = token.into();
        if current.token == token {
            return Ok(false);
        }

        tracing::info!(user_id = %current.user_id, "Access token refreshed");
        self.set_auth(Some(SessionAuth::new(current.user_id, token))).await;
        Ok(true)
    }

    async fn reset_all(&mut self) {
        self.auth_epoch += 1;
        self.teardown().await;
        self.threads.clear();
        self.current_thread = None;
        self.error = None;
        self.is_loading = false;
    }

    /// Close the open connection with a normal code
    async fn teardown(&mut self) {
        self.thread_epoch += 1;
        if let Some(active) = self.active.take() {
            tracing::debug!(thread_id = %active.reconciler.thread_id(), "Tearing down thread connection");
            active.manager.shutdown().await;
        }
        self.presence.reset();
        self.thinking.clear();
        self.link_up = false;
        self.connection_failure = None;
        self.token_expired = false;
        self.is_loading = false;
    }

    async fn reconnect_open_thread(&mut self) {
        let Some(thread_id) = self.active_thread_id().map(str::to_string) else {
            return;
        };
        let Some(auth) = self.auth.clone() else {
            return;
        };

        self.teardown().await;
        if let Err(e) = self.start_connection(&thread_id, &auth) {
            tracing::warn!(thread_id = %thread_id, error = %e, "Reconnect with refreshed token failed");
            self.error = Some(e.to_string());
        }
    }

    fn start_connection(&mut self, thread_id: &str, auth: &SessionAuth) -> Result<()> {
        let params = ConnectParams::new(thread_id, &auth.user_id, &auth.token);
        let (manager, events) =
            ConnectionManager::spawn(Arc::clone(&self.transport), &self.connection_config, params)?;
        manager.connect()?;

        self.active = Some(ActiveThread {
            manager,
            events,
            reconciler: MessageReconciler::new(thread_id, &auth.user_id),
        });
        Ok(())
    }

    /// Mount a thread: tear down any previous connection, then connect.
    /// Re-opening the thread that is already open only re-requests a connect.
    pub async fn open_thread(&mut self, thread_id: &str) -> Result<()> {
        let auth = self.require_auth()?;

        if let Some(active) = &self.active {
            if active.reconciler.thread_id() == thread_id {
                active.manager.connect()?;
                self.connection_failure = None;
                self.token_expired = false;
                return Ok(());
            }
        }

        self.teardown().await;

        let mut thread = self
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .cloned()
            .unwrap_or_else(|| Thread::new(thread_id, ""));
        thread.set_messages(Vec::new());
        self.current_thread = Some(thread);

        tracing::info!(thread_id, "Opening thread");
        self.start_connection(thread_id, &auth)
    }

    /// Unmount the open thread
    pub async fn close_thread(&mut self) {
        self.teardown().await;
        self.current_thread = None;
    }

    /// Manual reconnect, e.g. after the connection gave up
    pub fn reconnect(&mut self) -> Result<()> {
        let active = self.active.as_ref().ok_or(SessionError::NotConnected)?;
        active.manager.connect()?;
        self.connection_failure = None;
        self.token_expired = false;
        Ok(())
    }

    /// Explicit teardown: closes the connection and forgets all state
    pub async fn dispose(&mut self) {
        self.reset_all().await;
        self.auth = None;
    }

    pub fn active_thread_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.reconciler.thread_id())
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn current_thread(&self) -> Option<&Thread> {
        self.current_thread.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.current_thread
            .as_ref()
            .map(|t| t.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|a| a.manager.state())
            .unwrap_or(ConnectionState::Idle)
    }

    pub fn is_agent_thinking(&self) -> bool {
        let has_streaming = self.messages().iter().any(|m| m.is_streaming);
        self.thinking.is_thinking(has_streaming, Instant::now())
    }

    pub fn can_send(&self) -> bool {
        self.connection_state().is_open() && self.presence.can_send_messages()
    }

    pub fn input_placeholder(&self) -> &'static str {
        if self.active.is_none() {
            return "Select a thread to start chatting";
        }
        match self.connection_state() {
            ConnectionState::Open if !self.presence.can_send_messages() => {
                "You have view-only access to this thread"
            }
            ConnectionState::Open => "Type your message...",
            ConnectionState::Connecting | ConnectionState::Backoff { .. } => "Connecting...",
            ConnectionState::Failed => "Connection failed. Reconnect to continue",
            ConnectionState::Idle => "Disconnected",
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            thread_id: self.current_thread.as_ref().map(|t| t.id.clone()),
            title: self.current_thread.as_ref().map(|t| t.title.clone()),
            messages: self.messages().to_vec(),
            connection: self.connection_state(),
            is_agent_thinking: self.is_agent_thinking(),
            can_send: self.can_send(),
            local_role: self.presence.effective_role(),
            input_placeholder: self.input_placeholder(),
            participants: self.presence.participants().cloned().collect(),
            error: self.error.clone(),
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        tracing::debug!(level = ?notice.level, title = %notice.title, "Notice");
        let _ = self.notices.send(notice);
    }

    /// Record a persistence failure; unrecoverable auth failures sign out
    pub(crate) async fn persist_failure(&mut self, title: &str, error: PersistError) -> SessionError {
        tracing::warn!(error = %error, "{}", title);

        if error.requires_sign_in() {
            self.set_auth(None).await;
            self.notify(Notice::error("Session expired", "Please sign in again"));
        } else {
            self.notify(Notice::error(title, error.to_string()));
        }

        self.error = Some(error.to_string());
        SessionError::Persist(error)
    }

    fn reconcile(&mut self, event: ReconcileEvent) {
        let (Some(active), Some(thread)) = (self.active.as_ref(), self.current_thread.as_mut()) else {
            return;
        };
        let next = active.reconciler.apply(&thread.messages, event, Utc::now());
        thread.set_messages(next);
    }

    /// Send a message as the local user.
    ///
    /// Checks run in order: auth, role, connection. On success the optimistic
    /// message is already in the list; a transmit error or timeout marks it
    /// failed and leaves it in place for [`retry_message`](Self::retry_message).
    pub async fn send_message(&mut self, content: &str) -> Result<String> {
        let auth = self.require_auth()?;
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let thread_id = self.check_can_transmit()?;

        let message = Message::optimistic(
            &thread_id,
            content,
            &auth.user_id,
            Some(self.presence.effective_role()),
            Utc::now(),
        );
        let id = message.id.clone();

        self.reconcile(ReconcileEvent::LocalSend(message));
        self.thinking.on_send();

        self.transmit(&id, &thread_id, &auth.user_id, content).await?;
        Ok(id)
    }

    /// Re-transmit a failed message under its provisional id
    pub async fn retry_message(&mut self, id: &str) -> Result<()> {
        let auth = self.require_auth()?;
        let content = self
            .messages()
            .iter()
            .find(|m| m.id == id && m.has_failed())
            .map(|m| m.content.clone())
            .ok_or_else(|| SessionError::MessageNotFound(id.to_string()))?;

        let thread_id = self.check_can_transmit()?;

        self.reconcile(ReconcileEvent::MarkPending { id: id.to_string() });
        self.thinking.on_send();
        self.transmit(id, &thread_id, &auth.user_id, &content).await
    }

    /// Role gate, then connection gate. Returns the open thread id.
    fn check_can_transmit(&self) -> Result<String> {
        if !self.presence.can_send_messages() {
            self.notify(Notice::error(
                "Permission denied",
                "You have view-only access to this thread",
            ));
            return Err(SessionError::PermissionDenied(
                "viewers cannot send messages".to_string(),
            ));
        }

        match &self.active {
            Some(active) if active.manager.state().is_open() => {
                Ok(active.reconciler.thread_id().to_string())
            }
            _ => {
                self.notify(Notice::error("Not connected", "Wait for the connection to be restored"));
                Err(SessionError::NotConnected)
            }
        }
    }

    async fn transmit(&mut self, id: &str, thread_id: &str, user_id: &str, content: &str) -> Result<()> {
        let outbound = OutboundMessage::text(thread_id, user_id, content).with_client_id(id);
        let timeout = self.config.send_timeout();

        let result = match &self.active {
            Some(active) => tokio::time::timeout(timeout, active.manager.send(&outbound)).await,
            None => Ok(Err(ConnectionError::NotConnected)),
        };

        let error = match result {
            Ok(Ok(())) => {
                self.reconcile(ReconcileEvent::MarkSent { id: id.to_string() });
                return Ok(());
            }
            Ok(Err(e)) => SessionError::from(e),
            Err(_) => SessionError::SendTimeout(timeout),
        };

        tracing::warn!(message_id = id, error = %error, "Message transmission failed");
        self.reconcile(ReconcileEvent::MarkFailed { id: id.to_string() });
        self.thinking.clear();
        self.notify(Notice::error("Message not sent", error.to_string()));
        Err(error)
    }

    /// Wait for the next connection event (or thinking linger expiry) and fold
    /// it into session state. Returns `None` when no thread is open.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        enum Step {
            Event(Option<ConnectionEvent>),
            LingerElapsed,
        }

        let deadline = self.thinking.deadline();
        let step = {
            let active = self.active.as_mut()?;
            tokio::select! {
                event = active.events.recv() => Step::Event(event),
                _ = linger_elapsed(deadline) => Step::LingerElapsed,
            }
        };

        match step {
            Step::Event(Some(event)) => Some(self.handle_connection_event(event)),
            Step::Event(None) => None,
            Step::LingerElapsed => {
                self.thinking.expire(Instant::now());
                Some(SessionUpdate::Thinking)
            }
        }
    }

    /// Process every event already queued, without waiting
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        loop {
            let event = match self.active.as_mut() {
                Some(active) => active.events.try_recv().ok(),
                None => None,
            };
            match event {
                Some(event) => updates.push(self.handle_connection_event(event)),
                None => return updates,
            }
        }
    }

    /// Process events until the connection is up, it gives up, or `timeout` passes
    pub async fn wait_connected(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.link_up {
                return Ok(());
            }
            if let Some(attempts) = self.connection_failure {
                return Err(SessionError::ConnectionFailed { attempts });
            }
            if self.token_expired {
                return Err(SessionError::AuthRequired);
            }

            match tokio::time::timeout_at(deadline, self.next_update()).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Err(SessionError::NotConnected),
            }
        }
    }

    pub fn handle_connection_event(&mut self, event: ConnectionEvent) -> SessionUpdate {
        match event {
            ConnectionEvent::Connected => {
                // Role is unknown again until the server pushes it
                self.presence.reset();
                self.link_up = true;
                self.connection_failure = None;
                self.token_expired = false;
                self.error = None;
                SessionUpdate::Connection(self.connection_state())
            }
            ConnectionEvent::Disconnected { code } => {
                self.link_up = false;
                self.thinking.clear();
                self.presence.reset();
                if code == CloseCode::AUTH_REJECTED {
                    self.error = Some("Access to this thread was rejected".to_string());
                    self.notify(Notice::error("Access denied", "You no longer have access to this thread"));
                }
                SessionUpdate::Connection(self.connection_state())
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
                SessionUpdate::Connection(self.connection_state())
            }
            ConnectionEvent::Failed { attempts } => {
                self.connection_failure = Some(attempts);
                let error = SessionError::ConnectionFailed { attempts };
                self.error = Some(error.to_string());
                self.notify(Notice::error(
                    "Connection lost",
                    "Could not reconnect to the thread. Reconnect to try again.",
                ));
                SessionUpdate::Connection(self.connection_state())
            }
            ConnectionEvent::AuthExpired => {
                self.token_expired = true;
                self.error = Some(SessionError::AuthRequired.to_string());
                self.notify(Notice::error(
                    "Session expired",
                    "Your access token expired. Sign in again to reconnect.",
                ));
                SessionUpdate::Connection(self.connection_state())
            }
            ConnectionEvent::Inbound(event) => self.handle_inbound(event),
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) -> SessionUpdate {
        match event {
            InboundEvent::UserJoined { user_id, role } => {
                self.presence.apply_user_joined(&user_id, role, Utc::now());
                SessionUpdate::Presence
            }
            InboundEvent::UserLeft { user_id } => {
                self.presence.apply_user_left(&user_id);
                SessionUpdate::Presence
            }
            InboundEvent::ConnectionState { role } => {
                self.presence.apply_connection_state(role);
                if let Some(thread) = self.current_thread.as_mut() {
                    thread.user_role = Some(role);
                }
                SessionUpdate::Presence
            }
            InboundEvent::Error { message } => {
                self.thinking.clear();
                self.error = Some(message.clone());
                self.notify(Notice::error("Error", message.clone()));
                SessionUpdate::ServerError(message)
            }
            other => {
                if let Some(event) = ReconcileEvent::from_inbound(other) {
                    match &event {
                        ReconcileEvent::Stream { .. } => self.thinking.on_stream(),
                        ReconcileEvent::Complete { .. } => self.thinking.on_complete(Instant::now()),
                        _ => {}
                    }
                    self.reconcile(event);
                }
                SessionUpdate::Messages
            }
        }
    }
}

async fn linger_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
