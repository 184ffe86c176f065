//! Client for the remote chat backend
//!
//! The backend is an opaque request/response endpoint. Every call is issued at
//! most once: nothing here retries or caches, callers decide what to do with a
//! failure.

pub mod client;
pub mod queries;

pub use client::*;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::BotProfile;

/// Failure kinds reported by the backend client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Network or transport failure, or a response that could not be understood
    #[error("Chat backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend rejected the chatbot identifier
    #[error("Chatbot {0} rejected by backend")]
    InvalidBot(i64),

    /// The backend is throttling this conversation
    #[error("Rate limited by chat backend")]
    RateLimited,
}

/// Arguments of a single chat message call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(rename = "conversationId")]
    pub session_id: i64,
    #[serde(rename = "chatbotId")]
    pub bot_id: i64,
    #[serde(rename = "input")]
    pub text: String,
    pub file: String,
}

/// Remote operations used by the widget.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a new conversation for a chatbot and return its id.
    async fn start_session(&self, bot_id: i64) -> Result<i64, RpcError>;

    /// Send one user message and wait for the bot's reply text.
    async fn send_message(&self, request: &ChatRequest) -> Result<String, RpcError>;

    /// Fetch the chatbot's profile.
    async fn fetch_bot_profile(&self, bot_id: i64) -> Result<BotProfile, RpcError>;
}
