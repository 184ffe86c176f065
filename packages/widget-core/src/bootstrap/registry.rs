//! Two-phase global registry shared by the host page and the widget runtime.
//!
//! Each slot is explicitly typed: an alias from the well-known widget key to
//! the instance name, a pre-load command queue, or the live handler.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use super::{ApiCall, BootstrapError, CommandHandler};
use crate::types::{EmbedConfig, PendingCommand};

/// FIFO of host calls made before the runtime loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandQueue {
    entries: VecDeque<PendingCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: impl Into<String>, payload: Value) {
        self.entries.push_back(PendingCommand::new(operation, payload));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingCommand> {
        self.entries.iter()
    }
}

impl IntoIterator for CommandQueue {
    type Item = PendingCommand;
    type IntoIter = std::collections::vec_deque::IntoIter<PendingCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A registry entry
#[derive(Debug)]
pub enum Slot<H> {
    /// Well-known widget key pointing at the instance name
    Alias(String),
    /// Placeholder collecting calls until the runtime is ready
    Queue(CommandQueue),
    /// The live command handler
    Handler {
        handler: H,
        embed: Option<EmbedConfig>,
    },
}

/// Result of a host call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Stored for later; carries the queue length after the push
    Queued(usize),
    /// Executed by the live handler
    Handled,
}

/// The page-wide namespace both scripts agree on
#[derive(Debug)]
pub struct GlobalRegistry<H> {
    slots: HashMap<String, Slot<H>>,
}

impl<H> Default for GlobalRegistry<H> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<H: CommandHandler> GlobalRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side snippet: publish the instance name under the widget key and
    /// create an empty placeholder queue, unless they already exist.
    pub fn declare_instance(&mut self, widget_key: &str, instance: &str) {
        self.slots
            .entry(widget_key.to_string())
            .or_insert_with(|| Slot::Alias(instance.to_string()));
        self.slots
            .entry(instance.to_string())
            .or_insert_with(|| Slot::Queue(CommandQueue::new()));
    }

    /// Instance name published under a widget key
    pub fn alias(&self, widget_key: &str) -> Option<&str> {
        match self.slots.get(widget_key) {
            Some(Slot::Alias(instance)) => Some(instance),
            _ => None,
        }
    }

    pub(crate) fn set_alias(&mut self, widget_key: &str, instance: &str) {
        self.slots
            .insert(widget_key.to_string(), Slot::Alias(instance.to_string()));
    }

    pub(crate) fn set_queue(&mut self, instance: &str, queue: CommandQueue) {
        self.slots.insert(instance.to_string(), Slot::Queue(queue));
    }

    /// `window[instance](command, params)`: queue before load, execute after.
    pub fn call(
        &mut self,
        instance: &str,
        command: Option<&str>,
        params: Value,
    ) -> Result<CallOutcome, BootstrapError> {
        match self.slots.get_mut(instance) {
            Some(Slot::Queue(queue)) => {
                queue.push(command.unwrap_or_default(), params);
                tracing::debug!("Queued {:?} for {} ({} pending)", command, instance, queue.len());
                Ok(CallOutcome::Queued(queue.len()))
            }
            Some(Slot::Handler { handler, embed }) => {
                handler.handle(ApiCall {
                    method: command,
                    embed: embed.as_ref(),
                    params: &params,
                })?;
                Ok(CallOutcome::Handled)
            }
            _ => Err(BootstrapError::UnknownInstance(instance.to_string())),
        }
    }

    /// Install the live handler, replacing whatever occupied the slot.
    /// Returns the placeholder queue if there was one.
    pub fn install_handler(&mut self, instance: &str, handler: H) -> Option<CommandQueue> {
        let previous = self.slots.insert(
            instance.to_string(),
            Slot::Handler {
                handler,
                embed: None,
            },
        );

        match previous {
            Some(Slot::Queue(queue)) => Some(queue),
            Some(Slot::Handler { .. }) => {
                tracing::warn!("Replacing an already installed handler for {}", instance);
                None
            }
            _ => None,
        }
    }

    /// Attach the parsed embed config to an installed handler
    pub(crate) fn attach_embed(&mut self, instance: &str, config: EmbedConfig) {
        if let Some(Slot::Handler { embed, .. }) = self.slots.get_mut(instance) {
            *embed = Some(config);
        }
    }

    pub fn handler(&self, instance: &str) -> Option<&H> {
        match self.slots.get(instance) {
            Some(Slot::Handler { handler, .. }) => Some(handler),
            _ => None,
        }
    }

    pub fn handler_mut(&mut self, instance: &str) -> Option<&mut H> {
        match self.slots.get_mut(instance) {
            Some(Slot::Handler { handler, .. }) => Some(handler),
            _ => None,
        }
    }

    /// Whether the live handler is installed for an instance
    pub fn is_ready(&self, instance: &str) -> bool {
        self.handler(instance).is_some()
    }

    pub fn slot(&self, key: &str) -> Option<&Slot<H>> {
        self.slots.get(key)
    }
}
