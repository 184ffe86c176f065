//! Widget runtime settings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::session::FailurePolicy;
use crate::shell::DEFAULT_MOBILE_BREAKPOINT;
use crate::Result;

pub const DEFAULT_ENDPOINT: &str = "https://global-chat-qh6v.onrender.com/";
pub const DEFAULT_WIDGET_NAME: &str = "ChatbotWidget";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Settings shared by every widget instance in the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WidgetSettings {
    /// GraphQL endpoint of the chat backend
    pub endpoint: String,
    /// Well-known global key; the embed script tag id is `<widget_name>-Script`
    pub widget_name: String,
    /// Viewport width (px) below which an open panel hides the bubble
    pub mobile_breakpoint: u32,
    /// Whether failed replies are shown to the visitor
    pub failure_policy: FailurePolicy,
    /// Notice used by the `surface` policy when no bot-specific text applies
    pub failure_message: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            widget_name: DEFAULT_WIDGET_NAME.to_string(),
            mobile_breakpoint: DEFAULT_MOBILE_BREAKPOINT,
            failure_policy: FailurePolicy::default(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl WidgetSettings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("CHATBOT_WIDGET_CONFIG") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        directories::ProjectDirs::from("dk", "chatbotai", "chatbot-widget")
            .map(|dirs| dirs.config_dir().join("widget.toml"))
            .unwrap_or_else(|| PathBuf::from("widget.toml"))
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_path())
    }

    /// Load settings from a specific path, falling back to defaults if the
    /// file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(endpoint) = env::var("CHATBOT_WIDGET_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                settings.endpoint = endpoint;
            }
        }

        Ok(settings)
    }

    /// Id of the script element carrying the embed configuration.
    pub fn script_tag_id(&self) -> String {
        format!("{}-Script", self.widget_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = WidgetSettings::load_from_path(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(settings.widget_name, DEFAULT_WIDGET_NAME);
        assert_eq!(settings.mobile_breakpoint, 700);
        assert_eq!(settings.failure_policy, FailurePolicy::Suppress);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widget.toml");
        fs::write(
            &path,
            "widget_name = \"SupportChat\"\nfailure_policy = \"surface\"\nmobile_breakpoint = 640\n",
        )
        .unwrap();

        let settings = WidgetSettings::load_from_path(&path).unwrap();

        assert_eq!(settings.widget_name, "SupportChat");
        assert_eq!(settings.script_tag_id(), "SupportChat-Script");
        assert_eq!(settings.failure_policy, FailurePolicy::Surface);
        assert_eq!(settings.mobile_breakpoint, 640);
        assert_eq!(settings.failure_message, DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widget.toml");
        fs::write(&path, "mobile_breakpoint = \"wide\"").unwrap();

        assert!(matches!(
            WidgetSettings::load_from_path(&path),
            Err(crate::Error::Settings(_))
        ));
    }
}
