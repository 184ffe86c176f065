//! Scripted backend used by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use crate::rpc::{ChatBackend, ChatRequest, RpcError};
use crate::types::BotProfile;

/// A backend whose responses are queued up front.
///
/// Replies can also be held back: `hold_reply` returns a sender that settles
/// the next `send_message` call, so tests can inspect state mid-flight.
/// `hold_session` does the same for the next `start_session` call.
/// `reply_requested` fires when a held call starts waiting.
#[derive(Default)]
pub struct ScriptedBackend {
    starts: Mutex<VecDeque<Result<i64, RpcError>>>,
    replies: Mutex<VecDeque<Result<String, RpcError>>>,
    held: Mutex<VecDeque<oneshot::Receiver<Result<String, RpcError>>>>,
    held_starts: Mutex<VecDeque<oneshot::Receiver<Result<i64, RpcError>>>>,
    profile: Mutex<Option<Result<BotProfile, RpcError>>>,
    start_calls: Mutex<Vec<i64>>,
    sent: Mutex<Vec<ChatRequest>>,
    pub reply_requested: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, result: Result<i64, RpcError>) -> Self {
        self.starts.lock().unwrap().push_back(result);
        self
    }

    pub fn with_reply(self, result: Result<String, RpcError>) -> Self {
        self.replies.lock().unwrap().push_back(result);
        self
    }

    pub fn with_profile(self, result: Result<BotProfile, RpcError>) -> Self {
        *self.profile.lock().unwrap() = Some(result);
        self
    }

    pub fn hold_reply(&self) -> oneshot::Sender<Result<String, RpcError>> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().unwrap().push_back(rx);
        tx
    }

    pub fn hold_session(&self) -> oneshot::Sender<Result<i64, RpcError>> {
        let (tx, rx) = oneshot::channel();
        self.held_starts.lock().unwrap().push_back(rx);
        tx
    }

    pub fn start_calls(&self) -> Vec<i64> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<ChatRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn start_session(&self, bot_id: i64) -> Result<i64, RpcError> {
        self.start_calls.lock().unwrap().push(bot_id);
        let held = self.held_starts.lock().unwrap().pop_front();

        if let Some(rx) = held {
            self.reply_requested.notify_one();
            return rx
                .await
                .unwrap_or(Err(RpcError::BackendUnavailable("session dropped".into())));
        }

        self.starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RpcError::BackendUnavailable("no scripted session".into())))
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<String, RpcError> {
        self.sent.lock().unwrap().push(request.clone());
        let held = self.held.lock().unwrap().pop_front();

        if let Some(rx) = held {
            self.reply_requested.notify_one();
            return rx
                .await
                .unwrap_or(Err(RpcError::BackendUnavailable("reply dropped".into())));
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RpcError::BackendUnavailable("no scripted reply".into())))
    }

    async fn fetch_bot_profile(&self, bot_id: i64) -> Result<BotProfile, RpcError> {
        self.profile
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(RpcError::InvalidBot(bot_id)))
    }
}

/// Profile with a couple of suggestions and a rate-limit message.
pub fn sample_profile() -> BotProfile {
    BotProfile {
        id: 7,
        name: "helper".to_string(),
        message: Some("Hi! Ask me anything.".to_string()),
        suggested_messages: vec![Some("Pricing".to_string()), None, Some("Contact".to_string())],
        file: "kb.pdf".to_string(),
        rate_limiting: true,
        too_many_requests_message: Some("Too many messages, wait a minute.".to_string()),
        theme: Some("blue".to_string()),
        ..Default::default()
    }
}
