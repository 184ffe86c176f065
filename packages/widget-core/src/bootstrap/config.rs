//! Process-wide widget configuration built up by `init` calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::BootstrapError;
use crate::types::{lenient_id, EmbedConfig};

/// Configuration object shared by every `init` call of one handler.
///
/// Each `init` shallow-merges its parameters over the current values; the last
/// write wins per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetConfig {
    values: Map<String, Value>,
}

impl WidgetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `init` parameters. `null` is accepted as "no parameters".
    pub fn merge(&mut self, params: &Value) -> Result<(), BootstrapError> {
        match params {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for (key, value) in map {
                    self.values.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            other => Err(BootstrapError::InvalidParams {
                method: "init".to_string(),
                reason: format!("expected an object, got {}", other),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Typed mount parameters. Keys missing from the merged configuration fall
    /// back to the embed tag's config.
    pub fn mount_config(&self, embed: Option<&EmbedConfig>) -> Result<MountConfig, BootstrapError> {
        let mut values = embed.map(|e| e.config.clone()).unwrap_or_default();
        for (key, value) in &self.values {
            values.insert(key.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(values)).map_err(|e| BootstrapError::InvalidParams {
            method: "init".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Where and what to mount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    #[serde(deserialize_with = "lenient_id")]
    pub chatbot_id: i64,
    pub target_element_id: String,
    /// Overrides the runtime's mobile breakpoint for this instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_breakpoint: Option<u32>,
}
