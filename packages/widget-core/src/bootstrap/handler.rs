//! The real command handler installed by the loader.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::config::WidgetConfig;
use super::page::HostPage;
use super::{ApiCall, BootstrapError, Command, CommandHandler};
use crate::rpc::ChatBackend;
use crate::settings::WidgetSettings;
use crate::shell::{ShellOptions, Viewport, WidgetShell};
use crate::types::EmbedConfig;

/// Everything needed to mount a widget shell
#[derive(Clone)]
pub struct MountContext {
    backend: Arc<dyn ChatBackend>,
    viewport: Viewport,
    options: ShellOptions,
}

impl MountContext {
    pub fn new(backend: Arc<dyn ChatBackend>, viewport: Viewport, settings: &WidgetSettings) -> Self {
        Self {
            backend,
            viewport,
            options: ShellOptions::from(settings),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }
}

/// Mounted widget instances keyed by target element id
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    shells: HashMap<String, WidgetShell>,
    /// Target ids in mount order, most recent last
    order: Vec<String>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shell; an instance already mounted on the same target is
    /// unmounted and returned.
    pub fn insert(&mut self, shell: WidgetShell) -> Option<WidgetShell> {
        let target = shell.mount_config().target_element_id.clone();
        self.order.retain(|t| t != &target);
        self.order.push(target.clone());

        let mut previous = self.shells.insert(target, shell)?;
        previous.unmount();
        Some(previous)
    }

    pub fn remove(&mut self, target: &str) -> Option<WidgetShell> {
        self.order.retain(|t| t != target);
        let mut shell = self.shells.remove(target)?;
        shell.unmount();
        Some(shell)
    }

    pub fn get(&self, target: &str) -> Option<&WidgetShell> {
        self.shells.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut WidgetShell> {
        self.shells.get_mut(target)
    }

    /// The most recently mounted instance
    pub fn latest_mut(&mut self) -> Option<&mut WidgetShell> {
        let target = self.order.last()?;
        self.shells.get_mut(target)
    }

    /// Target ids in mount order
    pub fn targets(&self) -> &[String] {
        &self.order
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WidgetShell> {
        self.shells.values_mut()
    }

    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }
}

/// Payload of the `message` command
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostMessage {
    Text(String),
    #[serde(rename_all = "camelCase")]
    Targeted {
        text: String,
        #[serde(default)]
        target_element_id: Option<String>,
    },
}

/// Handles `init` and `message` for one widget global
pub struct ApiHandler {
    page: Arc<dyn HostPage>,
    context: MountContext,
    config: WidgetConfig,
    instances: InstanceRegistry,
}

impl ApiHandler {
    pub fn new(page: Arc<dyn HostPage>, context: MountContext) -> Self {
        Self {
            page,
            context,
            config: WidgetConfig::new(),
            instances: InstanceRegistry::new(),
        }
    }

    /// Configuration merged from every `init` so far
    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceRegistry {
        &mut self.instances
    }

    fn init(&mut self, embed: Option<&EmbedConfig>, params: &Value) -> Result<(), BootstrapError> {
        self.config.merge(params)?;
        let mount = self.config.mount_config(embed)?;

        if !self.page.has_element(&mount.target_element_id) {
            return Err(BootstrapError::TargetNotFound(mount.target_element_id));
        }

        let shell = WidgetShell::mount(
            mount,
            self.context.backend.clone(),
            &self.context.viewport,
            self.context.options.clone(),
        );
        if let Some(previous) = self.instances.insert(shell) {
            tracing::info!(
                "Replaced widget previously mounted on #{}",
                previous.mount_config().target_element_id
            );
        }
        Ok(())
    }

    fn message(&mut self, params: &Value) -> Result<(), BootstrapError> {
        let message = HostMessage::deserialize(params).map_err(|e| BootstrapError::InvalidParams {
            method: "message".to_string(),
            reason: e.to_string(),
        })?;

        let (text, target) = match message {
            HostMessage::Text(text) => (text, None),
            HostMessage::Targeted {
                text,
                target_element_id,
            } => (text, target_element_id),
        };

        let shell = match target {
            Some(target) => self
                .instances
                .get_mut(&target)
                .ok_or(BootstrapError::TargetNotFound(target))?,
            None => self
                .instances
                .latest_mut()
                .ok_or(BootstrapError::NoMountedWidget)?,
        };

        shell.host_message(text)?;
        Ok(())
    }
}

impl CommandHandler for ApiHandler {
    fn handle(&mut self, call: ApiCall<'_>) -> Result<(), BootstrapError> {
        let command = Command::parse(call.method)?;
        tracing::debug!("Handling API call {} {}", command, call.params);

        match command {
            Command::Init => self.init(call.embed, call.params),
            Command::Message => self.message(call.params),
        }
    }
}
