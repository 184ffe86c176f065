//! Bootstrap: turning a host page's embed into live widget instances
//!
//! The host page and the widget runtime load independently. Until the runtime
//! is ready, host calls land in a [`CommandQueue`] registered under the
//! instance's global name. [`load`] replaces that placeholder with the real
//! command handler and replays the queue in order.

pub mod config;
pub mod handler;
pub mod loader;
pub mod page;
pub mod registry;

pub use config::{MountConfig, WidgetConfig};
pub use handler::{ApiHandler, InstanceRegistry, MountContext};
pub use loader::{load, read_embed_config, DrainFailure, LoadReport};
pub use page::{HostPage, StaticPage};
pub use registry::{CallOutcome, CommandQueue, GlobalRegistry, Slot};

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::shell::ShellError;
use crate::types::EmbedConfig;

/// Errors raised while bootstrapping or dispatching host commands
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Cannot find script tag with id {0}")]
    MissingScriptTag(String),

    #[error("Script tag {0} has no data-config attribute")]
    MissingConfigAttribute(String),

    #[error("Malformed embed config: {0}")]
    MalformedConfig(#[from] serde_json::Error),

    #[error("API method required")]
    MissingMethod,

    #[error("Method {0} is not supported")]
    UnsupportedMethod(String),

    #[error("Invalid parameters for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("Target element #{0} not found")]
    TargetNotFound(String),

    #[error("No widget instance is mounted")]
    NoMountedWidget,

    #[error("No widget API registered under {0}")]
    UnknownInstance(String),

    #[error(transparent)]
    Widget(#[from] ShellError),
}

impl BootstrapError {
    /// Initialization errors abort the load; everything else is per command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BootstrapError::MissingScriptTag(_)
                | BootstrapError::MissingConfigAttribute(_)
                | BootstrapError::MalformedConfig(_)
        )
    }
}

/// Host API methods, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Init,
    Message,
}

impl Command {
    /// Parse an optional method name as given by the host.
    pub fn parse(method: Option<&str>) -> Result<Self, BootstrapError> {
        match method.map(str::trim).filter(|m| !m.is_empty()) {
            Some(method) => method.parse(),
            None => Err(BootstrapError::MissingMethod),
        }
    }
}

impl FromStr for Command {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "init" => Ok(Command::Init),
            "message" => Ok(Command::Message),
            "" => Err(BootstrapError::MissingMethod),
            other => Err(BootstrapError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Init => write!(f, "init"),
            Command::Message => write!(f, "message"),
        }
    }
}

/// One host API call as seen by a handler
#[derive(Debug, Clone, Copy)]
pub struct ApiCall<'a> {
    pub method: Option<&'a str>,
    /// Embed configuration parsed from the script tag, when one was read
    pub embed: Option<&'a EmbedConfig>,
    pub params: &'a Value,
}

/// The live implementation behind an instance's global name
pub trait CommandHandler {
    fn handle(&mut self, call: ApiCall<'_>) -> Result<(), BootstrapError>;
}
