//! Runtime start-up: install the handler and replay queued host calls.

use serde_json::Value;

use super::page::HostPage;
use super::registry::{CommandQueue, GlobalRegistry};
use super::{ApiCall, BootstrapError, CommandHandler};
use crate::types::EmbedConfig;

/// A queued call that failed while draining
#[derive(Debug)]
pub struct DrainFailure {
    /// Position in the queue
    pub index: usize,
    pub operation: String,
    pub error: BootstrapError,
}

/// Summary of a successful load
#[derive(Debug)]
pub struct LoadReport {
    pub instance_name: String,
    /// Number of queued calls replayed
    pub drained: usize,
    pub failures: Vec<DrainFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read and parse the embed script tag's `data-config` attribute.
pub fn read_embed_config<P>(page: &P, script_id: &str) -> Result<EmbedConfig, BootstrapError>
where
    P: HostPage + ?Sized,
{
    if !page.has_element(script_id) {
        return Err(BootstrapError::MissingScriptTag(script_id.to_string()));
    }
    let raw = page
        .attribute(script_id, "data-config")
        .ok_or_else(|| BootstrapError::MissingConfigAttribute(script_id.to_string()))?;

    tracing::debug!("Embed config: {}", raw);
    Ok(EmbedConfig::parse(&raw)?)
}

/// Start the widget runtime.
///
/// If the host has not published an instance name under `widget_name`, it is
/// taken from the `<widget_name>-Script` tag together with an implicit `init`
/// call. The handler built by `make_handler` then replaces the placeholder and
/// every queued call is replayed in order with the tag's config attached.
///
/// Initialization errors abort the load. A failing queued call is logged and
/// reported; the remaining calls still run.
pub fn load<H, P, F>(
    registry: &mut GlobalRegistry<H>,
    page: &P,
    widget_name: &str,
    make_handler: F,
) -> Result<LoadReport, BootstrapError>
where
    H: CommandHandler,
    P: HostPage + ?Sized,
    F: FnOnce() -> H,
{
    tracing::info!("{} starting", widget_name);
    let script_id = format!("{}-Script", widget_name);

    let instance_name = match registry.alias(widget_name) {
        Some(name) => name.to_string(),
        None => {
            let embed = read_embed_config(page, &script_id)?;
            let mut queue = CommandQueue::new();
            queue.push("init", Value::Object(embed.config.clone()));

            registry.set_alias(widget_name, &embed.name);
            registry.set_queue(&embed.name, queue);
            embed.name
        }
    };

    let placeholder = registry.install_handler(&instance_name, make_handler());
    let mut report = LoadReport {
        instance_name: instance_name.clone(),
        drained: 0,
        failures: Vec::new(),
    };

    let Some(queue) = placeholder else {
        tracing::debug!("No placeholder for {}, nothing to replay", instance_name);
        return Ok(report);
    };

    tracing::info!("{} placeholder found with {} queued calls", widget_name, queue.len());
    let operations: Vec<&str> = queue.iter().map(|c| c.operation.as_str()).collect();
    tracing::debug!("Replaying {:?}", operations);
    let embed = read_embed_config(page, &script_id)?;
    registry.attach_embed(&instance_name, embed.clone());

    let Some(handler) = registry.handler_mut(&instance_name) else {
        return Err(BootstrapError::UnknownInstance(instance_name));
    };

    for (index, command) in queue.into_iter().enumerate() {
        let result = handler.handle(ApiCall {
            method: Some(command.operation.as_str()),
            embed: Some(&embed),
            params: &command.payload,
        });
        report.drained += 1;

        if let Err(error) = result {
            tracing::warn!(
                "Queued call #{} ({}) failed: {}",
                index,
                command.operation,
                error
            );
            report.failures.push(DrainFailure {
                index,
                operation: command.operation,
                error,
            });
        }
    }

    Ok(report)
}
