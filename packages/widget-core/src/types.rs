//! Core data types shared by the widget components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Bot Profile
// ============================================================================

/// Static descriptor of a configured chatbot, fetched once per mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BotProfile {
    /// Backend identifier of the chatbot
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    /// Internal name, shown in the panel header
    pub name: String,
    /// Optional public-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Greeting shown above the conversation
    #[serde(default)]
    pub message: Option<String>,
    /// Alternative greeting configured for the first turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<String>,
    /// Suggested openers in display order (falsy entries are skipped)
    #[serde(default, deserialize_with = "nullable_list")]
    pub suggested_messages: Vec<Option<String>>,
    /// Theme token applied to the bubble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatbot_profile_picture: Option<String>,
    /// Hide the avatar even if one is configured
    #[serde(default, deserialize_with = "nullable_bool")]
    pub remove_profile_picture: bool,
    /// Background colour of user bubbles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_color: Option<String>,
    /// Resource reference passed through with every chat message
    #[serde(default, deserialize_with = "nullable_string")]
    pub file: String,
    /// Whether the backend throttles this bot's conversations
    #[serde(default, deserialize_with = "nullable_bool")]
    pub rate_limiting: bool,
    /// Text to show when a message is throttled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub too_many_requests_message: Option<String>,
    #[serde(default, deserialize_with = "nullable_bool")]
    pub collect_user_name: bool,
    #[serde(default, deserialize_with = "nullable_bool")]
    pub collect_user_email: bool,
    #[serde(default, deserialize_with = "nullable_bool")]
    pub collect_user_phone: bool,
    #[serde(default, deserialize_with = "nullable_bool")]
    pub collect_user_message: bool,
}

impl BotProfile {
    /// Name to show in the panel header.
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Greeting shown before the first message.
    pub fn greeting(&self) -> Option<&str> {
        non_blank(&self.message).or_else(|| non_blank(&self.initial_message))
    }

    /// Avatar URL, unless the bot is configured to hide it.
    pub fn avatar(&self) -> Option<&str> {
        if self.remove_profile_picture {
            return None;
        }
        self.chatbot_profile_picture.as_deref()
    }

    /// Suggested openers with falsy entries removed.
    pub fn suggestions(&self) -> Vec<&str> {
        self.suggested_messages
            .iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Configured rate-limit text, if throttling is enabled for this bot.
    pub fn rate_limit_message(&self) -> Option<&str> {
        if !self.rate_limiting {
            return None;
        }
        self.too_many_requests_message
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

fn non_blank(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|text| !text.trim().is_empty())
}

// ============================================================================
// Messages
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// A message in a conversation. Append-only, kept in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Render-time projection of a message.
///
/// `is_fresh_bot_reply` is computed when the view is produced and is never
/// stored on the message itself.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub role: Role,
    pub text: String,
    pub is_fresh_bot_reply: bool,
}

// ============================================================================
// Embedding
// ============================================================================

/// A host API call recorded before the widget runtime was ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub operation: String,
    pub payload: Value,
}

impl PendingCommand {
    pub fn new(operation: impl Into<String>, payload: Value) -> Self {
        Self {
            operation: operation.into(),
            payload,
        }
    }
}

/// Payload of the embed script tag's `data-config` attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EmbedConfig {
    /// Global name the host uses to call the widget API
    pub name: String,
    /// Parameters for the implicit `init` call
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl EmbedConfig {
    /// Parse a `data-config` attribute value.
    ///
    /// Embeds write the JSON with single quotes so it fits in a double-quoted
    /// HTML attribute; they are normalized before parsing.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let normalized = raw.replace('\'', "\"");
        serde_json::from_str(&normalized)
    }
}

// ============================================================================
// Lenient deserializers
// ============================================================================

/// Accept an integer id given either as a JSON number or a numeric string.
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("id {} is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("id {:?} is not an integer", s))),
        other => Err(D::Error::custom(format!("expected an integer id, got {}", other))),
    }
}

fn nullable_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_from_backend_json() {
        let profile: BotProfile = serde_json::from_value(json!({
            "id": "12",
            "name": "support",
            "displayName": "Support Bot",
            "message": "Hej! How can I help?",
            "suggestedMessages": ["Pricing", null, "", "Opening hours"],
            "file": null,
            "rateLimiting": true,
            "tooManyRequestsMessage": "Slow down",
            "collectUserEmail": null
        }))
        .unwrap();

        assert_eq!(profile.id, 12);
        assert_eq!(profile.title(), "Support Bot");
        assert_eq!(profile.greeting(), Some("Hej! How can I help?"));
        assert_eq!(profile.suggestions(), vec!["Pricing", "Opening hours"]);
        assert_eq!(profile.file, "");
        assert_eq!(profile.rate_limit_message(), Some("Slow down"));
        assert!(!profile.collect_user_email);
    }

    #[test]
    fn test_rate_limit_message_requires_flag() {
        let profile = BotProfile {
            rate_limiting: false,
            too_many_requests_message: Some("Slow down".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.rate_limit_message(), None);
    }

    #[test]
    fn test_blank_greeting_falls_back_to_initial_message() {
        let profile = BotProfile {
            message: Some("   ".to_string()),
            initial_message: Some("Welcome back!".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.greeting(), Some("Welcome back!"));

        let silent = BotProfile {
            message: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(silent.greeting(), None);
    }

    #[test]
    fn test_avatar_hidden_when_removed() {
        let profile = BotProfile {
            chatbot_profile_picture: Some("https://cdn.example/bot.png".to_string()),
            remove_profile_picture: true,
            ..Default::default()
        };
        assert_eq!(profile.avatar(), None);
    }

    #[test]
    fn test_embed_config_single_quotes() {
        let raw = "{'name':'chatbot','config':{'chatbotId':3,'targetElementId':'root'}}";
        let embed = EmbedConfig::parse(raw).unwrap();

        assert_eq!(embed.name, "chatbot");
        assert_eq!(embed.config["chatbotId"], json!(3));
        assert_eq!(embed.config["targetElementId"], json!("root"));
    }

    #[test]
    fn test_embed_config_malformed() {
        assert!(EmbedConfig::parse("{'name':").is_err());
    }

    #[test]
    fn test_duplicate_messages_allowed() {
        let user = Message::user("hello");
        let bot = Message::bot("hello");
        assert_eq!(user.text, bot.text);
        assert_ne!(user.role, bot.role);
    }
}
