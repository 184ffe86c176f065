//! Widget Core - embeddable chatbot widget runtime.
//!
//! This crate provides everything a host page needs to turn a script tag into a
//! live chat widget:
//!
//! - **Backend client**: `StartChat`, `Chat` and `GetChatbotDetail` over GraphQL
//! - **Sessions**: lazily created conversations with an explicit in-flight guard
//! - **Bootstrap**: the pre-load command queue and the host-facing command API
//! - **Shell**: bubble/panel state, responsive visibility and presentation views
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use widget_core::bootstrap::{self, ApiHandler, GlobalRegistry, MountContext, StaticPage};
//! use widget_core::rpc::GraphqlClient;
//! use widget_core::shell::Viewport;
//! use widget_core::WidgetSettings;
//!
//! let settings = WidgetSettings::default();
//! let page = Arc::new(
//!     StaticPage::new()
//!         .with_element("chat-root")
//!         .with_script(
//!             &settings.script_tag_id(),
//!             "{'name':'chatbot','config':{'chatbotId':7,'targetElementId':'chat-root'}}",
//!         ),
//! );
//! let context = MountContext::new(
//!     Arc::new(GraphqlClient::new(&settings.endpoint)),
//!     Viewport::new(1280),
//!     &settings,
//! );
//!
//! let mut registry = GlobalRegistry::new();
//! let report = bootstrap::load(&mut registry, page.as_ref(), &settings.widget_name, || {
//!     ApiHandler::new(page.clone(), context.clone())
//! })
//! .unwrap();
//! println!("instance {} drained {} commands", report.instance_name, report.drained);
//! ```

pub mod bootstrap;
pub mod rpc;
pub mod session;
pub mod settings;
pub mod shell;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use bootstrap::{BootstrapError, GlobalRegistry, LoadReport};
pub use rpc::{ChatBackend, ChatRequest, GraphqlClient, RpcError};
pub use session::{ChatSession, FailurePolicy, SendOutcome, SessionError, SessionPhase};
pub use settings::WidgetSettings;
pub use shell::{ShellError, ShellView, Viewport, WidgetShell};
pub use types::{BotProfile, EmbedConfig, Message, MessageView, PendingCommand, Role};

/// Error types for widget-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Result type for widget-core operations.
pub type Result<T> = std::result::Result<T, Error>;
