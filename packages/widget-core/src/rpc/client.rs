//! GraphQL-over-HTTP implementation of the chat backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::queries::{CHAT, GET_CHATBOT_DETAIL, START_CHAT};
use super::{ChatBackend, ChatRequest, RpcError};
use crate::types::BotProfile;

/// Error codes the backend uses for throttled requests
const RATE_LIMIT_CODES: &[&str] = &["TOO_MANY_REQUESTS", "RATE_LIMITED"];

/// Error codes the backend uses when the chatbot id is not accepted
const INVALID_BOT_CODES: &[&str] = &["NOT_FOUND", "BAD_USER_INPUT"];

/// HTTP client for the chat backend's GraphQL endpoint
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    client: Client,
}

impl GraphqlClient {
    /// Create a new client for the given endpoint URL
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: Client::new(),
        }
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a GraphQL operation and return its `data` object
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
        bot_id: i64,
    ) -> Result<Option<T>, RpcError> {
        tracing::debug!("Executing {} against {}", operation, self.endpoint);

        let body = GraphqlRequest {
            operation_name: operation,
            query,
            variables,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RpcError::RateLimited);
        }
        if !status.is_success() {
            return Err(RpcError::BackendUnavailable(format!(
                "{} failed: {} {}",
                operation,
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let envelope: GraphqlResponse<T> = response.json().await.map_err(|e| {
            RpcError::BackendUnavailable(format!("{} returned a malformed response: {}", operation, e))
        })?;

        if !envelope.errors.is_empty() {
            return Err(classify_errors(&envelope.errors, bot_id));
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl ChatBackend for GraphqlClient {
    async fn start_session(&self, bot_id: i64) -> Result<i64, RpcError> {
        let data: Option<StartChatData> = self
            .execute("StartChat", START_CHAT, json!({ "chatbotId": bot_id }), bot_id)
            .await?;

        let id = data.and_then(|d| d.start_chat).ok_or_else(|| {
            RpcError::BackendUnavailable("StartChat returned no conversation id".to_string())
        })?;

        parse_id(&id).ok_or_else(|| {
            RpcError::BackendUnavailable(format!("StartChat returned a non-integer id: {}", id))
        })
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<String, RpcError> {
        let variables = serde_json::to_value(request)
            .map_err(|e| RpcError::BackendUnavailable(e.to_string()))?;

        let data: Option<ChatData> = self.execute("Chat", CHAT, variables, request.bot_id).await?;

        data.and_then(|d| d.chat)
            .ok_or_else(|| RpcError::BackendUnavailable("Chat returned no reply".to_string()))
    }

    async fn fetch_bot_profile(&self, bot_id: i64) -> Result<BotProfile, RpcError> {
        let data: Option<ChatbotDetailData> = self
            .execute("GetChatbotDetail", GET_CHATBOT_DETAIL, json!({ "id": bot_id }), bot_id)
            .await?;

        data.and_then(|d| d.get_chatbot_detail)
            .ok_or(RpcError::InvalidBot(bot_id))
    }
}

/// Map GraphQL errors onto the client's failure kinds
fn classify_errors(errors: &[GraphqlError], bot_id: i64) -> RpcError {
    let has_code = |codes: &[&str]| {
        errors.iter().any(|e| {
            e.code()
                .map(|code| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
                .unwrap_or(false)
        })
    };

    if has_code(RATE_LIMIT_CODES) {
        RpcError::RateLimited
    } else if has_code(INVALID_BOT_CODES) {
        RpcError::InvalidBot(bot_id)
    } else {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        RpcError::BackendUnavailable(messages.join("; "))
    }
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Wire types matching the backend's JSON structure

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a> {
    operation_name: &'a str,
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct GraphqlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphqlError {
    fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartChatData {
    #[serde(default)]
    start_chat: Option<Value>,
}

#[derive(Deserialize)]
struct ChatData {
    #[serde(default)]
    chat: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatbotDetailData {
    #[serde(default)]
    get_chatbot_detail: Option<BotProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str, code: Option<&str>) -> GraphqlError {
        GraphqlError {
            message: message.to_string(),
            extensions: code.map(|c| json!({ "code": c })),
        }
    }

    #[test]
    fn test_classify_rate_limit() {
        let errors = vec![error("slow down", Some("TOO_MANY_REQUESTS"))];
        assert_eq!(classify_errors(&errors, 4), RpcError::RateLimited);
    }

    #[test]
    fn test_classify_invalid_bot() {
        let errors = vec![error("no such chatbot", Some("NOT_FOUND"))];
        assert_eq!(classify_errors(&errors, 4), RpcError::InvalidBot(4));
    }

    #[test]
    fn test_classify_other_errors_join_messages() {
        let errors = vec![error("db down", None), error("retry later", Some("INTERNAL"))];
        assert_eq!(
            classify_errors(&errors, 4),
            RpcError::BackendUnavailable("db down; retry later".to_string())
        );
    }

    #[test]
    fn test_chat_request_variables() {
        let request = ChatRequest {
            session_id: 9,
            bot_id: 2,
            text: "hi".to_string(),
            file: "faq.pdf".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({ "conversationId": 9, "chatbotId": 2, "input": "hi", "file": "faq.pdf" })
        );
    }

    #[test]
    fn test_parse_id_accepts_numeric_strings() {
        assert_eq!(parse_id(&json!(17)), Some(17));
        assert_eq!(parse_id(&json!("17")), Some(17));
        assert_eq!(parse_id(&json!("seventeen")), None);
    }
}
