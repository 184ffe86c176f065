//! Conversation session state machine.
//!
//! A [`ChatSession`] is created when the chat panel opens and discarded when it
//! closes. The backend conversation id is requested lazily on the first send and
//! reused for every later send of the same session.
//!
//! State lives behind a mutex that is never held across an `.await`, so the
//! optimistic user message and the pending flag are visible while a reply is
//! still in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::rpc::{ChatBackend, ChatRequest, RpcError};
use crate::types::{BotProfile, Message, MessageView, Role};

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No conversation id and no messages yet
    Empty,
    /// The conversation id is being requested
    Starting,
    /// Conversation open, nothing in flight
    Active,
    /// A chat message is waiting for the bot's reply
    AwaitingReply,
}

/// What to show the visitor when a reply fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and leave the user message unanswered
    #[default]
    Suppress,
    /// Append a bot notice describing the failure
    Surface,
}

/// Result of a send whose user message was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The bot replied and the reply was appended
    Replied,
    /// The chat call failed; the user message stays in history
    Failed(RpcError),
}

/// Errors that prevent a send from being recorded at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Could not start conversation: {0}")]
    Start(RpcError),

    #[error("A reply is already pending")]
    ReplyPending,

    #[error("Message is empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Starting,
    Reply,
}

#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<i64>,
    messages: Vec<Message>,
    input: String,
    in_flight: Option<InFlight>,
    /// Number of messages already included in a render
    rendered: usize,
}

/// Clears the in-flight marker when a send is dropped before it settles, so
/// an abandoned call (timeout, cancelled task) does not leave the session busy.
struct InFlightGuard<'a> {
    state: &'a Mutex<SessionState>,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(state: &'a Mutex<SessionState>) -> Self {
        Self { state, armed: true }
    }

    /// Must be called before taking the state lock on the normal path.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.in_flight.take().is_some() {
            tracing::debug!("Send abandoned before it settled");
        }
    }
}

/// One open conversation between a visitor and a chatbot.
///
/// Cloning is cheap and clones share the same conversation.
#[derive(Clone)]
pub struct ChatSession {
    profile: Arc<BotProfile>,
    backend: Arc<dyn ChatBackend>,
    policy: FailurePolicy,
    failure_message: Arc<str>,
    state: Arc<Mutex<SessionState>>,
}

impl ChatSession {
    pub fn new(
        profile: Arc<BotProfile>,
        backend: Arc<dyn ChatBackend>,
        policy: FailurePolicy,
        failure_message: &str,
    ) -> Self {
        Self {
            profile,
            backend,
            policy,
            failure_message: Arc::from(failure_message),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Send the contents of the input buffer.
    pub async fn submit_input(&self) -> Result<SendOutcome, SessionError> {
        let text = self.state().input.clone();
        self.send_message(text).await
    }

    /// Send one of the bot's suggested openers.
    pub async fn send_suggestion(&self, text: &str) -> Result<SendOutcome, SessionError> {
        self.send_message(text).await
    }

    /// Send a user message and wait for the bot's reply.
    ///
    /// Starts the conversation first if needed; if that fails nothing is
    /// recorded. Once the user message is appended, chat failures are logged and
    /// reported as [`SendOutcome::Failed`] rather than as an error.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<SendOutcome, SessionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let existing = {
            let mut state = self.state();
            if state.in_flight.is_some() {
                tracing::warn!("Rejecting send while a reply is pending");
                return Err(SessionError::ReplyPending);
            }
            match state.session_id {
                Some(id) => {
                    Self::record_user_message(&mut state, &text);
                    Some(id)
                }
                None => {
                    state.in_flight = Some(InFlight::Starting);
                    None
                }
            }
        };

        let in_flight = InFlightGuard::new(&self.state);
        let session_id = match existing {
            Some(id) => id,
            None => self.start(&text).await?,
        };

        let request = ChatRequest {
            session_id,
            bot_id: self.profile.id,
            text,
            file: self.profile.file.clone(),
        };
        let result = self.backend.send_message(&request).await;

        in_flight.disarm();
        let mut state = self.state();
        state.in_flight = None;
        match result {
            Ok(reply) => {
                tracing::debug!("Reply received for conversation {}", session_id);
                state.messages.push(Message::bot(reply));
                Ok(SendOutcome::Replied)
            }
            Err(err) => {
                tracing::error!("Chat message failed for conversation {}: {}", session_id, err);
                if let Some(notice) = self.failure_notice(&err) {
                    state.messages.push(Message::bot(notice));
                }
                Ok(SendOutcome::Failed(err))
            }
        }
    }

    /// Request the conversation id, then record the first user message.
    async fn start(&self, text: &str) -> Result<i64, SessionError> {
        let result = self.backend.start_session(self.profile.id).await;

        let mut state = self.state();
        match result {
            Ok(id) => {
                tracing::debug!("Conversation {} started for chatbot {}", id, self.profile.id);
                state.session_id = Some(id);
                Self::record_user_message(&mut state, text);
                Ok(id)
            }
            Err(err) => {
                tracing::error!("Could not start conversation for chatbot {}: {}", self.profile.id, err);
                state.in_flight = None;
                Err(SessionError::Start(err))
            }
        }
    }

    fn record_user_message(state: &mut SessionState, text: &str) {
        state.messages.push(Message::user(text));
        state.input.clear();
        state.in_flight = Some(InFlight::Reply);
    }

    fn failure_notice(&self, err: &RpcError) -> Option<String> {
        match self.policy {
            FailurePolicy::Suppress => None,
            FailurePolicy::Surface => {
                let rate_limited = match err {
                    RpcError::RateLimited => self.profile.rate_limit_message(),
                    _ => None,
                };
                Some(rate_limited.unwrap_or(&*self.failure_message).to_string())
            }
        }
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    pub fn phase(&self) -> SessionPhase {
        let state = self.state();
        match (state.in_flight, state.session_id) {
            (Some(InFlight::Starting), _) => SessionPhase::Starting,
            (Some(InFlight::Reply), _) => SessionPhase::AwaitingReply,
            (None, None) => SessionPhase::Empty,
            (None, Some(_)) => SessionPhase::Active,
        }
    }

    /// Whether a reply is in flight (drives the typing indicator).
    pub fn pending(&self) -> bool {
        self.state().in_flight == Some(InFlight::Reply)
    }

    /// Whether a send would currently be rejected.
    pub fn is_busy(&self) -> bool {
        self.state().in_flight.is_some()
    }

    pub fn session_id(&self) -> Option<i64> {
        self.state().session_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state().messages.is_empty()
    }

    pub fn input(&self) -> String {
        self.state().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.state().input = text.into();
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    /// Produce the message list for display.
    ///
    /// The most recent bot message is marked fresh on the first render that
    /// includes it, and never again.
    pub fn render(&self) -> Vec<MessageView> {
        let mut state = self.state();
        let last_bot = state.messages.iter().rposition(|m| m.role == Role::Bot);
        let rendered = state.rendered;

        let views = state
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| MessageView {
                role: message.role,
                text: message.text.clone(),
                is_fresh_bot_reply: Some(index) == last_bot && index >= rendered,
            })
            .collect();

        state.rendered = state.messages.len();
        views
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ChatSession")
            .field("bot_id", &self.profile.id)
            .field("session_id", &state.session_id)
            .field("messages", &state.messages.len())
            .field("in_flight", &state.in_flight)
            .finish()
    }
}
