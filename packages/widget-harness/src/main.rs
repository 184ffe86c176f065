//! Widget Harness - a terminal host page for the chatbot widget.
//!
//! Loads an HTML embed page, runs the widget bootstrap against it and drives
//! the mounted widget from stdin.

mod page;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use widget_core::bootstrap::{self, ApiHandler, GlobalRegistry, MountContext, StaticPage};
use widget_core::shell::{PendingReply, ShellBody, WidgetShell};
use widget_core::{GraphqlClient, Role, SendOutcome, SessionError, Viewport, WidgetSettings};

/// Delay between characters of a fresh bot reply
const TYPING_DELAY: Duration = Duration::from_millis(12);

/// Redraw interval while a reply is pending
const PENDING_POLL: Duration = Duration::from_millis(150);

#[derive(Parser)]
#[command(name = "widget-harness")]
#[command(about = "Run the chatbot widget against an HTML embed page")]
#[command(version)]
struct Cli {
    /// HTML page containing the embed script tag and target element
    #[arg(short, long)]
    page: PathBuf,

    /// Settings file (defaults to the per-user config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial viewport width in pixels
    #[arg(short, long, default_value = "1280")]
    width: u32,

    /// Host call made before the widget loads, as COMMAND=JSON (repeatable)
    #[arg(short, long = "queue")]
    queue: Vec<String>,
}

type Registry = GlobalRegistry<ApiHandler>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => WidgetSettings::load_from_path(path),
        None => WidgetSettings::load(),
    }
    .context("Failed to load widget settings")?;

    let html = std::fs::read_to_string(&cli.page)
        .with_context(|| format!("Failed to read {}", cli.page.display()))?;
    let page = Arc::new(page::scan_html(&html)?);

    let context = MountContext::new(
        Arc::new(GraphqlClient::new(&settings.endpoint)),
        Viewport::new(cli.width),
        &settings,
    );

    let mut registry = Registry::new();
    if !cli.queue.is_empty() {
        queue_host_calls(&mut registry, page.as_ref(), &settings, &cli.queue)?;
    }

    let report = bootstrap::load(&mut registry, page.as_ref(), &settings.widget_name, || {
        ApiHandler::new(page.clone(), context.clone())
    })
    .context("Widget failed to initialize")?;

    tracing::info!(
        "Instance {} ready, {} queued calls replayed",
        report.instance_name,
        report.drained
    );
    for failure in &report.failures {
        eprintln!("queued call #{} ({}) failed: {}", failure.index, failure.operation, failure.error);
    }

    let instance = report.instance_name;
    load_profiles(&mut registry, &instance).await?;

    let mut screen = Screen::default();
    screen.render(&mut registry, &instance, true).await?;
    repl(&mut registry, &instance, context.viewport(), &mut screen).await
}

/// Simulate the async host snippet: declare the instance and queue calls
/// before the runtime has loaded.
fn queue_host_calls(
    registry: &mut Registry,
    page: &StaticPage,
    settings: &WidgetSettings,
    calls: &[String],
) -> Result<()> {
    let embed = bootstrap::read_embed_config(page, &settings.script_tag_id())?;
    registry.declare_instance(&settings.widget_name, &embed.name);

    for call in calls {
        let (command, payload) = match call.split_once('=') {
            Some((command, json)) => (
                command,
                serde_json::from_str::<Value>(json)
                    .with_context(|| format!("Invalid JSON payload in --queue {}", call))?,
            ),
            None => (call.as_str(), Value::Null),
        };
        registry.call(&embed.name, Some(command), payload)?;
    }
    Ok(())
}

async fn load_profiles(registry: &mut Registry, instance: &str) -> Result<()> {
    let handler = registry
        .handler_mut(instance)
        .ok_or_else(|| anyhow!("No handler installed for {}", instance))?;

    if handler.instances().is_empty() {
        bail!("No widget was mounted; check the init configuration");
    }
    for shell in handler.instances_mut().iter_mut() {
        if let Err(err) = shell.load_profile().await {
            eprintln!(
                "chatbot {} unavailable: {}",
                shell.mount_config().chatbot_id,
                err
            );
        }
    }
    Ok(())
}

fn active_shell<'a>(registry: &'a mut Registry, instance: &str) -> Result<&'a mut WidgetShell> {
    registry
        .handler_mut(instance)
        .and_then(|handler| handler.instances_mut().latest_mut())
        .ok_or_else(|| anyhow!("No mounted widget"))
}

enum Flow {
    Continue,
    Quit,
}

/// Read stdin and the pending reply side by side, so the widget keeps
/// handling commands while a reply is in flight.
async fn repl(
    registry: &mut Registry,
    instance: &str,
    viewport: &Viewport,
    screen: &mut Screen,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<PendingReply> = None;
    let mut poll = tokio::time::interval(PENDING_POLL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute(registry, instance, viewport, line, &mut pending) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(err) => eprintln!("error: {:#}", err),
                }
                screen.render(registry, instance, true).await?;
            }
            joined = wait_for(&mut pending), if pending.is_some() => {
                pending = None;
                match joined {
                    Ok(Ok(outcome)) => report_outcome(outcome),
                    Ok(Err(err)) => eprintln!("error: {}", err),
                    Err(err) => eprintln!("send task failed: {}", err),
                }
                screen.render(registry, instance, false).await?;
            }
            _ = poll.tick(), if pending.is_some() => {
                screen.render(registry, instance, false).await?;
            }
        }
    }

    Ok(())
}

async fn wait_for(
    pending: &mut Option<PendingReply>,
) -> std::result::Result<std::result::Result<SendOutcome, SessionError>, JoinError> {
    match pending {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn execute(
    registry: &mut Registry,
    instance: &str,
    viewport: &Viewport,
    line: &str,
    pending: &mut Option<PendingReply>,
) -> Result<Flow> {
    let (command, arg) = match line.strip_prefix('/') {
        Some(rest) => rest.split_once(' ').unwrap_or((rest, "")),
        None => ("", line),
    };

    match command {
        "quit" | "exit" => return Ok(Flow::Quit),
        "open" => active_shell(registry, instance)?.open()?,
        "close" => active_shell(registry, instance)?.close(),
        "resize" => resize(registry, instance, viewport, arg)?,
        "message" => {
            registry.call(instance, Some("message"), Value::String(arg.to_string()))?;
        }
        "suggest" => {
            let index = suggestion_index(arg)?;
            ensure_idle(pending)?;
            *pending = Some(active_shell(registry, instance)?.spawn_suggestion(index)?);
        }
        "" => {
            ensure_idle(pending)?;
            let shell = active_shell(registry, instance)?;
            if !shell.is_open() {
                shell.open()?;
            }
            shell.set_input(arg)?;
            *pending = Some(shell.spawn_submit()?);
        }
        other => bail!("Unknown command /{}", other),
    }

    Ok(Flow::Continue)
}

fn ensure_idle(pending: &Option<PendingReply>) -> Result<()> {
    if pending.is_some() {
        bail!("Wait for the current reply first");
    }
    Ok(())
}

/// Convert a 1-based `/suggest` argument into a suggestion index.
fn suggestion_index(arg: &str) -> Result<usize> {
    let number: usize = arg
        .trim()
        .parse()
        .with_context(|| format!("Invalid suggestion number: {}", arg))?;
    if number == 0 {
        bail!("Suggestions start at 1");
    }
    Ok(number - 1)
}

fn resize(registry: &mut Registry, instance: &str, viewport: &Viewport, arg: &str) -> Result<()> {
    let width: u32 = arg
        .trim()
        .parse()
        .with_context(|| format!("Invalid width: {}", arg))?;
    viewport.resize(width);

    if let Some(handler) = registry.handler_mut(instance) {
        for shell in handler.instances_mut().iter_mut() {
            if shell.sync_viewport() {
                println!("[#{} at {}px]", shell.mount_config().target_element_id, shell.width());
            }
        }
    }
    Ok(())
}

fn report_outcome(outcome: SendOutcome) {
    if let SendOutcome::Failed(err) = outcome {
        eprintln!("message not answered: {}", err);
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// What has already been printed
#[derive(Default)]
struct Screen {
    /// Messages of the current conversation already printed
    shown: usize,
    /// Typing line printed for the pending reply
    typing_shown: bool,
}

impl Screen {
    /// Print what changed since the last render. Without `full`, only new
    /// messages and the typing line are printed.
    async fn render(&mut self, registry: &mut Registry, instance: &str, full: bool) -> Result<()> {
        let view = active_shell(registry, instance)?.view();

        let panel = match view.body {
            ShellBody::Open(panel) => panel,
            ShellBody::Closed => {
                self.shown = 0;
                self.typing_shown = false;
                if full {
                    let bubble = if view.bubble_visible { "(chat)" } else { "" };
                    println!("[panel closed] {}", bubble);
                }
                return Ok(());
            }
            ShellBody::Loading if full => {
                println!("[loading chatbot]");
                return Ok(());
            }
            ShellBody::Error { reason } if full => {
                println!("[chatbot unavailable: {}]", reason);
                return Ok(());
            }
            _ => return Ok(()),
        };

        if self.shown == 0 && (full || !panel.messages.is_empty()) {
            println!("== {} ==", panel.title);
            if let Some(greeting) = &panel.greeting {
                println!("{}", greeting);
            }
        }
        if self.shown > panel.messages.len() {
            self.shown = 0;
        }

        for message in &panel.messages[self.shown..] {
            match message.role {
                Role::User => println!("you> {}", message.text),
                Role::Bot if message.is_fresh_bot_reply => {
                    type_out(&panel.title, &message.text).await?
                }
                Role::Bot => println!("{}> {}", panel.title, message.text),
            }
        }
        self.shown = panel.messages.len();

        if panel.typing {
            if !self.typing_shown {
                println!("[{} is typing...]", panel.title);
                self.typing_shown = true;
            }
        } else {
            self.typing_shown = false;
        }

        if full {
            if panel.messages.is_empty() {
                for (i, suggestion) in panel.suggestions.iter().enumerate() {
                    println!("  /suggest {}  {}", i + 1, suggestion);
                }
            }
            if !view.bubble_visible {
                println!("[bubble hidden]");
            }
        }
        Ok(())
    }
}

async fn type_out(title: &str, text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}> ", title)?;
    for ch in text.chars() {
        write!(stdout, "{}", ch)?;
        stdout.flush()?;
        tokio::time::sleep(TYPING_DELAY).await;
    }
    writeln!(stdout)?;
    Ok(())
}
