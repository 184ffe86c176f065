//! Widget shell: bubble and panel chrome around a chat session
//!
//! The shell owns UI-only state (open/closed, bubble visibility) and the bot
//! profile, and delegates everything conversational to [`ChatSession`].

pub mod viewport;

pub use viewport::{bubble_visible, Viewport, DEFAULT_MOBILE_BREAKPOINT};

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bootstrap::MountConfig;
use crate::rpc::{ChatBackend, RpcError};
use crate::session::{ChatSession, FailurePolicy, SendOutcome, SessionError};
use crate::settings::WidgetSettings;
use crate::types::{BotProfile, MessageView};

/// Errors raised by shell interactions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShellError {
    #[error("Chatbot profile is not loaded")]
    ProfileNotLoaded,

    #[error("Chat panel is closed")]
    PanelClosed,

    #[error("No suggested message at position {0}")]
    NoSuchSuggestion(usize),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Per-shell behaviour taken from the runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOptions {
    pub mobile_breakpoint: u32,
    pub failure_policy: FailurePolicy,
    pub failure_message: String,
}

impl From<&WidgetSettings> for ShellOptions {
    fn from(settings: &WidgetSettings) -> Self {
        Self {
            mobile_breakpoint: settings.mobile_breakpoint,
            failure_policy: settings.failure_policy,
            failure_message: settings.failure_message.clone(),
        }
    }
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self::from(&WidgetSettings::default())
    }
}

/// A send running on its own task
pub type PendingReply = JoinHandle<Result<SendOutcome, SessionError>>;

/// Loading state of the bot profile
#[derive(Debug, Clone)]
enum ProfileState {
    Loading,
    Ready(Arc<BotProfile>),
    Failed(String),
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BubbleIcon {
    Chat,
    Close,
}

/// Presentation model of the whole widget
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShellView {
    pub bubble_visible: bool,
    pub bubble_icon: BubbleIcon,
    pub theme: Option<String>,
    pub body: ShellBody,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ShellBody {
    Loading,
    Error { reason: String },
    Closed,
    Open(PanelView),
}

/// Presentation model of the open chat panel
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub title: String,
    pub avatar: Option<String>,
    pub greeting: Option<String>,
    pub messages: Vec<MessageView>,
    /// Typing indicator
    pub typing: bool,
    pub suggestions: Vec<String>,
    pub input: String,
    pub user_message_color: Option<String>,
}

// ============================================================================
// Shell
// ============================================================================

/// A mounted widget instance
pub struct WidgetShell {
    mount: MountConfig,
    backend: Arc<dyn ChatBackend>,
    options: ShellOptions,
    profile: ProfileState,
    is_open: bool,
    bubble_visible: bool,
    width: u32,
    viewport: Option<watch::Receiver<u32>>,
    session: Option<ChatSession>,
    /// Host message received before the panel could open
    pending_input: Option<String>,
}

impl WidgetShell {
    /// Mount a shell and subscribe it to viewport resizes.
    pub fn mount(
        mount: MountConfig,
        backend: Arc<dyn ChatBackend>,
        viewport: &Viewport,
        options: ShellOptions,
    ) -> Self {
        let mut receiver = viewport.subscribe();
        let width = *receiver.borrow_and_update();

        tracing::info!(
            "Mounting chatbot {} into #{}",
            mount.chatbot_id,
            mount.target_element_id
        );

        let mut shell = Self {
            mount,
            backend,
            options,
            profile: ProfileState::Loading,
            is_open: false,
            bubble_visible: true,
            width,
            viewport: Some(receiver),
            session: None,
            pending_input: None,
        };
        shell.refresh_visibility();
        shell
    }

    /// Release the resize listener and discard any open conversation.
    pub fn unmount(&mut self) {
        if self.viewport.take().is_some() {
            tracing::debug!("Unmounting widget from #{}", self.mount.target_element_id);
        }
        self.session = None;
        self.is_open = false;
    }

    pub fn is_mounted(&self) -> bool {
        self.viewport.is_some()
    }

    /// Fetch the bot profile from the backend.
    pub async fn load_profile(&mut self) -> Result<Arc<BotProfile>, RpcError> {
        self.profile = ProfileState::Loading;

        match self.backend.fetch_bot_profile(self.mount.chatbot_id).await {
            Ok(profile) => {
                tracing::debug!("Loaded profile for chatbot {}", profile.id);
                let profile = Arc::new(profile);
                self.profile = ProfileState::Ready(profile.clone());
                if self.pending_input.is_some() {
                    if let Err(err) = self.open() {
                        tracing::warn!("Could not open panel for held host message: {}", err);
                    }
                }
                Ok(profile)
            }
            Err(err) => {
                tracing::error!("Could not load chatbot {}: {}", self.mount.chatbot_id, err);
                self.profile = ProfileState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    // ========================================================================
    // Open / close
    // ========================================================================

    /// Toggle the panel; returns whether it is now open.
    pub fn toggle(&mut self) -> Result<bool, ShellError> {
        if self.is_open {
            self.close();
        } else {
            self.open()?;
        }
        Ok(self.is_open)
    }

    /// Open the panel, starting a fresh conversation.
    pub fn open(&mut self) -> Result<(), ShellError> {
        if self.is_open {
            return Ok(());
        }
        let ProfileState::Ready(profile) = &self.profile else {
            return Err(ShellError::ProfileNotLoaded);
        };

        let session = ChatSession::new(
            profile.clone(),
            self.backend.clone(),
            self.options.failure_policy,
            &self.options.failure_message,
        );
        if let Some(text) = self.pending_input.take() {
            session.set_input(text);
        }

        self.session = Some(session);
        self.is_open = true;
        self.refresh_visibility();
        Ok(())
    }

    /// Close the panel. The conversation is discarded; reopening starts over.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Discarding conversation {:?}", session.session_id());
        }
        self.is_open = false;
        self.refresh_visibility();
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    /// Apply the latest viewport width if it changed; returns whether it did.
    pub fn sync_viewport(&mut self) -> bool {
        let Some(receiver) = self.viewport.as_mut() else {
            return false;
        };

        match receiver.has_changed() {
            Ok(true) => {
                let width = *receiver.borrow_and_update();
                self.on_resize(width);
                true
            }
            _ => false,
        }
    }

    pub fn on_resize(&mut self, width: u32) {
        self.width = width;
        self.refresh_visibility();
    }

    fn refresh_visibility(&mut self) {
        self.bubble_visible = bubble_visible(self.width, self.is_open, self.breakpoint());
    }

    fn breakpoint(&self) -> u32 {
        self.mount
            .mobile_breakpoint
            .unwrap_or(self.options.mobile_breakpoint)
    }

    // ========================================================================
    // Conversation
    // ========================================================================

    /// Suggested openers, offered only while the conversation is empty.
    pub fn suggestions(&self) -> Vec<String> {
        match (&self.profile, &self.session) {
            (ProfileState::Ready(profile), Some(session)) if session.is_empty() => {
                profile.suggestions().into_iter().map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn set_input(&self, text: impl Into<String>) -> Result<(), ShellError> {
        self.open_session()?.set_input(text);
        Ok(())
    }

    /// Send the input buffer (send button or Enter).
    pub async fn submit_input(&self) -> Result<SendOutcome, ShellError> {
        let session = self.open_session()?.clone();
        Ok(session.submit_input().await?)
    }

    /// Send the suggested opener at `index` of [`Self::suggestions`].
    pub async fn send_suggestion(&self, index: usize) -> Result<SendOutcome, ShellError> {
        let (session, text) = self.suggestion_at(index)?;
        Ok(session.send_suggestion(&text).await?)
    }

    /// Like [`Self::submit_input`], but runs the send on its own task so the
    /// caller can keep rendering, resizing and closing while the reply is
    /// pending.
    pub fn spawn_submit(&self) -> Result<PendingReply, ShellError> {
        let session = self.open_session()?.clone();
        Ok(tokio::spawn(async move { session.submit_input().await }))
    }

    /// Like [`Self::send_suggestion`], on its own task.
    pub fn spawn_suggestion(&self, index: usize) -> Result<PendingReply, ShellError> {
        let (session, text) = self.suggestion_at(index)?;
        Ok(tokio::spawn(async move { session.send_suggestion(&text).await }))
    }

    fn suggestion_at(&self, index: usize) -> Result<(ChatSession, String), ShellError> {
        let session = self.open_session()?.clone();
        let text = self
            .suggestions()
            .into_iter()
            .nth(index)
            .ok_or(ShellError::NoSuchSuggestion(index))?;
        Ok((session, text))
    }

    /// Handle a payload forwarded by the host's `message` command: open the
    /// panel and pre-fill the input.
    pub fn host_message(&mut self, text: impl Into<String>) -> Result<(), ShellError> {
        let text = text.into();
        match self.profile {
            ProfileState::Ready(_) => {
                self.open()?;
                self.set_input(text)
            }
            _ => {
                tracing::debug!("Profile not ready, holding host message until open");
                self.pending_input = Some(text);
                Ok(())
            }
        }
    }

    fn open_session(&self) -> Result<&ChatSession, ShellError> {
        self.session.as_ref().ok_or(ShellError::PanelClosed)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn mount_config(&self) -> &MountConfig {
        &self.mount
    }

    pub fn profile(&self) -> Option<&BotProfile> {
        match &self.profile {
            ProfileState::Ready(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn bubble_visible(&self) -> bool {
        self.bubble_visible
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Build the presentation model. Rendering consumes fresh-reply flags.
    pub fn view(&self) -> ShellView {
        let theme = self.profile().and_then(|p| p.theme.clone());
        let bubble_icon = if self.is_open {
            BubbleIcon::Close
        } else {
            BubbleIcon::Chat
        };

        let body = match (&self.profile, &self.session) {
            (ProfileState::Loading, _) => ShellBody::Loading,
            (ProfileState::Failed(reason), _) => ShellBody::Error {
                reason: reason.clone(),
            },
            (ProfileState::Ready(_), None) => ShellBody::Closed,
            (ProfileState::Ready(profile), Some(session)) => ShellBody::Open(PanelView {
                title: profile.title().to_string(),
                avatar: profile.avatar().map(str::to_string),
                greeting: profile.greeting().map(str::to_string),
                messages: session.render(),
                typing: session.pending(),
                suggestions: self.suggestions(),
                input: session.input(),
                user_message_color: profile.user_message_color.clone(),
            }),
        };

        ShellView {
            bubble_visible: self.bubble_visible,
            bubble_icon,
            theme,
            body,
        }
    }
}

impl std::fmt::Debug for WidgetShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetShell")
            .field("mount", &self.mount)
            .field("profile", &self.profile)
            .field("is_open", &self.is_open)
            .field("bubble_visible", &self.bubble_visible)
            .field("width", &self.width)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_profile, ScriptedBackend};
    use crate::types::Role;

    fn mount_config() -> MountConfig {
        MountConfig {
            chatbot_id: 7,
            target_element_id: "chat-root".to_string(),
            mobile_breakpoint: None,
        }
    }

    fn mounted(backend: ScriptedBackend, viewport: &Viewport) -> WidgetShell {
        WidgetShell::mount(
            mount_config(),
            Arc::new(backend),
            viewport,
            ShellOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_narrow_open_panel_hides_bubble() {
        let viewport = Viewport::new(500);
        let mut shell = mounted(ScriptedBackend::new().with_profile(Ok(sample_profile())), &viewport);
        shell.load_profile().await.unwrap();
        assert!(shell.bubble_visible());

        shell.toggle().unwrap();
        assert!(!shell.bubble_visible());

        viewport.resize(1200);
        assert!(shell.sync_viewport());
        assert!(shell.bubble_visible());

        viewport.resize(500);
        shell.sync_viewport();
        assert!(!shell.bubble_visible());
        assert!(!shell.sync_viewport());
    }

    #[tokio::test]
    async fn test_mount_override_breakpoint() {
        let viewport = Viewport::new(800);
        let mut shell = WidgetShell::mount(
            MountConfig {
                mobile_breakpoint: Some(1024),
                ..mount_config()
            },
            Arc::new(ScriptedBackend::new().with_profile(Ok(sample_profile()))),
            &viewport,
            ShellOptions::default(),
        );
        shell.load_profile().await.unwrap();
        shell.open().unwrap();

        assert!(!shell.bubble_visible());
    }

    #[test]
    fn test_open_requires_profile() {
        let viewport = Viewport::new(1024);
        let mut shell = mounted(ScriptedBackend::new(), &viewport);

        assert_eq!(shell.toggle(), Err(ShellError::ProfileNotLoaded));
        assert!(matches!(shell.view().body, ShellBody::Loading));
    }

    #[tokio::test]
    async fn test_failed_profile_shows_error() {
        let viewport = Viewport::new(1024);
        let mut shell = mounted(
            ScriptedBackend::new().with_profile(Err(RpcError::InvalidBot(7))),
            &viewport,
        );

        assert_eq!(shell.load_profile().await, Err(RpcError::InvalidBot(7)));
        assert!(matches!(shell.view().body, ShellBody::Error { .. }));
    }

    #[tokio::test]
    async fn test_reopen_starts_fresh_session() {
        let viewport = Viewport::new(1024);
        let backend = ScriptedBackend::new()
            .with_profile(Ok(sample_profile()))
            .with_session(Ok(1))
            .with_reply(Ok("hello".into()))
            .with_session(Ok(2))
            .with_reply(Ok("hello again".into()));
        let mut shell = mounted(backend, &viewport);
        shell.load_profile().await.unwrap();

        shell.open().unwrap();
        shell.set_input("hi").unwrap();
        shell.submit_input().await.unwrap();
        assert_eq!(shell.session().unwrap().session_id(), Some(1));

        shell.close();
        assert!(shell.session().is_none());
        assert_eq!(shell.submit_input().await, Err(ShellError::PanelClosed));

        shell.open().unwrap();
        assert!(shell.session().unwrap().is_empty());
        shell.set_input("hi").unwrap();
        shell.submit_input().await.unwrap();
        assert_eq!(shell.session().unwrap().session_id(), Some(2));
    }

    #[tokio::test]
    async fn test_suggestions_only_while_empty() {
        let viewport = Viewport::new(1024);
        let backend = ScriptedBackend::new()
            .with_profile(Ok(sample_profile()))
            .with_session(Ok(1))
            .with_reply(Ok("Contact us at...".into()));
        let mut shell = mounted(backend, &viewport);
        shell.load_profile().await.unwrap();

        assert!(shell.suggestions().is_empty());
        shell.open().unwrap();
        assert_eq!(shell.suggestions(), vec!["Pricing", "Contact"]);

        assert_eq!(
            shell.send_suggestion(5).await,
            Err(ShellError::NoSuchSuggestion(5))
        );
        assert_eq!(shell.send_suggestion(1).await, Ok(SendOutcome::Replied));

        let messages = shell.session().unwrap().messages();
        assert_eq!(messages[0].text, "Contact");
        assert!(shell.suggestions().is_empty());
    }

    #[tokio::test]
    async fn test_view_marks_reply_fresh_once() {
        let viewport = Viewport::new(1024);
        let backend = ScriptedBackend::new()
            .with_profile(Ok(sample_profile()))
            .with_session(Ok(1))
            .with_reply(Ok("Hello!".into()));
        let mut shell = mounted(backend, &viewport);
        shell.load_profile().await.unwrap();
        shell.open().unwrap();
        shell.set_input("hi").unwrap();
        shell.submit_input().await.unwrap();

        let ShellBody::Open(panel) = shell.view().body else {
            panic!("panel should be open");
        };
        assert_eq!(panel.title, "helper");
        assert_eq!(panel.greeting.as_deref(), Some("Hi! Ask me anything."));
        assert!(!panel.typing);
        assert_eq!(panel.messages[1].role, Role::Bot);
        assert!(panel.messages[1].is_fresh_bot_reply);

        let ShellBody::Open(panel) = shell.view().body else {
            panic!("panel should be open");
        };
        assert!(!panel.messages[1].is_fresh_bot_reply);
    }

    #[tokio::test]
    async fn test_host_message_before_profile() {
        let viewport = Viewport::new(1024);
        let mut shell = mounted(ScriptedBackend::new().with_profile(Ok(sample_profile())), &viewport);

        shell.host_message("I need help with my order").unwrap();
        assert!(!shell.is_open());

        shell.load_profile().await.unwrap();
        assert!(shell.is_open());
        assert_eq!(shell.session().unwrap().input(), "I need help with my order");
    }

    #[tokio::test]
    async fn test_spawned_send_keeps_shell_responsive() {
        let viewport = Viewport::new(1024);
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_profile(Ok(sample_profile()))
                .with_session(Ok(1)),
        );
        let release = backend.hold_reply();
        let mut shell = WidgetShell::mount(
            mount_config(),
            backend.clone(),
            &viewport,
            ShellOptions::default(),
        );
        shell.load_profile().await.unwrap();
        shell.open().unwrap();
        shell.set_input("hi").unwrap();

        let task = shell.spawn_submit().unwrap();
        backend.reply_requested.notified().await;

        let ShellBody::Open(panel) = shell.view().body else {
            panic!("panel should be open");
        };
        assert!(panel.typing);
        assert_eq!(panel.messages.len(), 1);
        assert_eq!(panel.input, "");

        viewport.resize(500);
        assert!(shell.sync_viewport());
        assert!(!shell.bubble_visible());
        assert_eq!(shell.width(), 500);

        release.send(Ok("hello".into())).unwrap();
        assert_eq!(task.await.unwrap(), Ok(SendOutcome::Replied));

        let ShellBody::Open(panel) = shell.view().body else {
            panic!("panel should be open");
        };
        assert!(!panel.typing);
        assert!(panel.messages[1].is_fresh_bot_reply);
    }

    #[tokio::test]
    async fn test_spawn_suggestion_checks_index() {
        let viewport = Viewport::new(1024);
        let backend = ScriptedBackend::new()
            .with_profile(Ok(sample_profile()))
            .with_session(Ok(1))
            .with_reply(Ok("Our prices...".into()));
        let mut shell = mounted(backend, &viewport);
        shell.load_profile().await.unwrap();

        assert!(matches!(shell.spawn_suggestion(0), Err(ShellError::PanelClosed)));
        shell.open().unwrap();
        assert!(matches!(
            shell.spawn_suggestion(2),
            Err(ShellError::NoSuchSuggestion(2))
        ));

        let task = shell.spawn_suggestion(0).unwrap();
        assert_eq!(task.await.unwrap(), Ok(SendOutcome::Replied));
        assert_eq!(shell.session().unwrap().messages()[0].text, "Pricing");
    }

    #[test]
    fn test_unmount_releases_resize_listener() {
        let viewport = Viewport::new(1024);
        let mut shell = mounted(ScriptedBackend::new(), &viewport);
        assert_eq!(viewport.listener_count(), 1);

        shell.unmount();
        assert_eq!(viewport.listener_count(), 0);
        assert!(!shell.is_mounted());

        let dropped = mounted(ScriptedBackend::new(), &viewport);
        assert_eq!(viewport.listener_count(), 1);
        drop(dropped);
        assert_eq!(viewport.listener_count(), 0);
    }
}
