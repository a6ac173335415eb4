//! Lifecycle controller
//!
//! Owns startup ordering and the single event loop of a running bridge.
//!
//! Cold start:
//!
//! 1. `Ready` is queued when the lifecycle is created, so it is handled before
//!    any open-url or forwarded event. Handling it scans the startup
//!    arguments (or `OUTLOOKBRIDGE_URL` in development mode) for a protocol URL.
//! 2. Single-instance arbitration. A secondary forwards its arguments and
//!    returns without doing anything else.
//! 3. Protocol handler registration (skipped in development mode).
//! 4. Stale attachment sweep, then the event loop starts.
//!
//! Events are handled one at a time, in arrival order. A compose in progress
//! is awaited inside the loop, so later events wait behind it. With
//! `ui.wait_for_surface` set, every link that arrives before `UiLoaded` is
//! held and the held links run in arrival order once the surface loads.
//!
//! Open-url events come from the application shell that embeds the
//! lifecycle. It pushes them through [`Lifecycle::event_sender`].
//!
//! Every failure while handling one URL is reported through [`Feedback`] and
//! the loop keeps running. Panics are caught at the same boundary.

use crate::compose::{AttachmentResolver, Dispatcher, Platform};
use crate::config::BridgeConfig;
use crate::events::{self, BridgeEvent, EventReceiver, EventSender};
use crate::feedback::{DialogFeedback, Feedback, LogFeedback, SharedFeedback};
use crate::instance::{Coordinator, InstanceRole};
use crate::protocol::{find_protocol_arg, ProtocolParser};
use crate::registrar::{ensure_registered, registrar_for, ProtocolRegistrar};
use crate::{BridgeError, Result};
use automation::{AutomationResult, ProcessRunner, Runner};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable read for the protocol URL in development mode
pub const DEV_URL_ENV: &str = "OUTLOOKBRIDGE_URL";

/// Process-wide state of a running bridge
pub struct AppContext {
    pub config: BridgeConfig,
    pub parser: ProtocolParser,
    pub dispatcher: Dispatcher,
    pub feedback: SharedFeedback,
    /// Protocol URLs received before the UI surface finished loading, oldest first
    pub pending: VecDeque<String>,
    /// The UI surface reported it has loaded
    pub ui_ready: bool,
}

impl AppContext {
    /// Parse `url`, pick the platform strategy and open the draft
    pub async fn compose_from_url(&self, url: &str) -> Result<AutomationResult> {
        let request = self.parser.parse(url)?;
        let strategy = self.dispatcher.select()?;

        tracing::info!(
            strategy = strategy.name(),
            to = %request.to(),
            attachments = request.attachments().len(),
            "Opening Outlook draft"
        );
        let result = strategy.compose(&request).await?;
        if !result.succeeded {
            return Err(BridgeError::Automation(result.diagnostic_message));
        }
        Ok(result)
    }

    /// Log an invocation failure and tell the user about it
    pub fn report(&self, error: &BridgeError) {
        tracing::warn!(kind = error.kind(), "Protocol invocation failed: {}", error);
        self.feedback.log(&error.to_string());
        self.feedback
            .notify(error.notification_title(), &error.to_string());
    }

    /// Whether a URL arriving now has to wait for the UI surface
    fn must_hold(&self) -> bool {
        self.config.ui.wait_for_surface && !self.ui_ready
    }
}

/// The outside world a [`Lifecycle`] talks to
pub struct Collaborators {
    pub platform: Platform,
    pub runner: Arc<dyn Runner>,
    pub feedback: SharedFeedback,
    pub registrar: Arc<dyn ProtocolRegistrar>,
}

impl Collaborators {
    /// Real processes, native dialogs and the platform registrar
    pub fn native(platform: Platform, config: &BridgeConfig) -> Self {
        let runner: Arc<dyn Runner> = Arc::new(ProcessRunner::with_timeout(
            config.automation.script_timeout(),
        ));
        let feedback: SharedFeedback = if config.notifications.dialogs {
            Arc::new(DialogFeedback::new(Arc::clone(&runner), platform))
        } else {
            Arc::new(LogFeedback)
        };
        let registrar = registrar_for(platform, Arc::clone(&runner));

        Self {
            platform,
            runner,
            feedback,
            registrar,
        }
    }
}

/// How a call to [`Lifecycle::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another instance was running and received the arguments
    Forwarded,

    /// This process was the primary; `handled` protocol URLs were processed
    Served { handled: usize },
}

enum LoopControl {
    Continue,
    Stop,
}

pub struct Lifecycle {
    context: AppContext,
    registrar: Arc<dyn ProtocolRegistrar>,
    coordinator: Coordinator,
    executable: Option<PathBuf>,
    dev_url: Option<String>,
    startup_args: Vec<String>,
    events_tx: EventSender,
    events_rx: Option<EventReceiver>,
    ready: bool,
    handled: usize,
}

impl Lifecycle {
    pub fn new(config: BridgeConfig, collaborators: Collaborators) -> Result<Self> {
        let resolver = Arc::new(AttachmentResolver::new(&config.attachments)?);
        let dispatcher = Dispatcher::new(
            collaborators.platform,
            collaborators.runner,
            resolver,
            config.automation.clone(),
            Arc::clone(&collaborators.feedback),
        );
        let (events_tx, events_rx) = events::channel();
        // The receiver is held below, so this cannot fail
        let _ = events_tx.send(BridgeEvent::Ready);

        Ok(Self {
            coordinator: Coordinator::from_config(&config),
            registrar: collaborators.registrar,
            executable: None,
            dev_url: std::env::var(DEV_URL_ENV).ok(),
            startup_args: Vec::new(),
            events_tx,
            events_rx: Some(events_rx),
            ready: false,
            handled: 0,
            context: AppContext {
                parser: ProtocolParser::from_config(&config),
                dispatcher,
                feedback: collaborators.feedback,
                pending: VecDeque::new(),
                ui_ready: false,
                config,
            },
        })
    }

    /// Path registered as the protocol handler (defaults to the current executable)
    pub fn with_executable(mut self, exe: impl Into<PathBuf>) -> Self {
        self.executable = Some(exe.into());
        self
    }

    /// Override the development-mode URL instead of reading `OUTLOOKBRIDGE_URL`
    pub fn with_dev_url(mut self, url: Option<String>) -> Self {
        self.dev_url = url;
        self
    }

    /// Queue for platform events (open-url, UI loaded, shutdown)
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Run until shutdown, or forward `argv` to the running instance
    pub async fn run(&mut self, argv: Vec<String>) -> Result<RunOutcome> {
        tracing::info!(args = ?argv, dev_mode = self.context.config.dev_mode, "outlookbridge starting");

        let mut events_rx = self
            .events_rx
            .take()
            .ok_or_else(|| BridgeError::Other("Lifecycle already ran".to_string()))?;

        let _primary = match self.coordinator.acquire(self.events_tx.clone()).await? {
            InstanceRole::Secondary(secondary) => {
                secondary.forward(&argv).await?;
                return Ok(RunOutcome::Forwarded);
            }
            InstanceRole::Primary(primary) => primary,
        };

        self.startup_args = argv;
        self.register().await;
        self.sweep_attachments();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if let LoopControl::Stop = self.handle_event(event).await {
                        break;
                    }
                    if self.is_idle(&events_rx) {
                        tracing::debug!("Event queue drained, exiting");
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }

        self.settle_feedback().await;
        tracing::info!(handled = self.handled, "outlookbridge stopped");
        Ok(RunOutcome::Served {
            handled: self.handled,
        })
    }

    fn is_idle(&self, events_rx: &EventReceiver) -> bool {
        self.context.config.ui.exit_when_idle
            && self.ready
            && self.context.pending.is_empty()
            && events_rx.is_empty()
    }

    /// Wait for notification dialogs that are still being launched
    async fn settle_feedback(&self) {
        for task in self.context.feedback.take_outstanding() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Notification task failed");
            }
        }
    }

    async fn register(&self) {
        let config = &self.context.config;
        if config.dev_mode {
            tracing::info!(
                "Development mode: protocol registration skipped, set {}={}... to test a link",
                DEV_URL_ENV,
                config.scheme_prefix()
            );
            return;
        }

        let exe = match self.executable.clone() {
            Some(exe) => exe,
            None => match std::env::current_exe() {
                Ok(exe) => exe,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot determine executable path, registration skipped");
                    return;
                }
            },
        };

        if let Err(e) = ensure_registered(self.registrar.as_ref(), &config.scheme, &exe).await {
            tracing::warn!(scheme = %config.scheme, error = %e, "Protocol handler registration failed");
        }
    }

    fn sweep_attachments(&self) {
        let hours = self.context.config.attachments.retention_hours;
        let max_age = Duration::from_secs(hours.saturating_mul(3600));
        if let Err(e) = self.context.dispatcher.resolver().sweep_stale(max_age) {
            tracing::warn!(error = %e, "Stale attachment sweep failed");
        }
    }

    async fn handle_event(&mut self, event: BridgeEvent) -> LoopControl {
        tracing::debug!(event = event.name(), "Handling event");
        match event {
            BridgeEvent::Ready => {
                self.ready = true;
                let config = &self.context.config;
                let initial = initial_protocol_arg(
                    &self.startup_args,
                    config.dev_mode,
                    self.dev_url.clone(),
                    &config.scheme_prefix(),
                );
                match initial {
                    Some(url) => self.deliver(url).await,
                    None => tracing::debug!("No protocol URL at startup"),
                }
            }
            BridgeEvent::UiLoaded => {
                self.context.ui_ready = true;
                while let Some(url) = self.context.pending.pop_front() {
                    tracing::debug!(remaining = self.context.pending.len(), "UI surface loaded, handling held link");
                    self.handle_protocol(&url).await;
                }
            }
            BridgeEvent::OpenUrl(url) => self.deliver(url).await,
            BridgeEvent::SecondInstance(args) => {
                let prefix = self.context.config.scheme_prefix();
                match find_protocol_arg(&args, &prefix) {
                    Some(url) => self.deliver(url).await,
                    None => tracing::debug!(args = ?args, "Forwarded launch carried no protocol URL"),
                }
            }
            BridgeEvent::Shutdown => {
                tracing::info!("Received shutdown event");
                return LoopControl::Stop;
            }
        }
        LoopControl::Continue
    }

    /// Handle `url` now, or hold it until the UI surface has loaded
    async fn deliver(&mut self, url: String) {
        if self.context.must_hold() {
            tracing::debug!(held = self.context.pending.len() + 1, "UI surface not loaded yet, holding link");
            self.context.pending.push_back(url);
            return;
        }
        self.handle_protocol(&url).await;
    }

    async fn handle_protocol(&mut self, url: &str) {
        self.handled += 1;
        tracing::debug!(url, "Handling protocol URL");
        self.context.feedback.log("Received mail link");

        let outcome = AssertUnwindSafe(self.context.compose_from_url(url))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => {
                tracing::info!(detail = %result.diagnostic_message, "Outlook draft ready for review");
            }
            Ok(Err(e)) => self.context.report(&e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Protocol invocation panicked");
                self.context.feedback.log(&message);
                self.context.feedback.notify(
                    "Outlook Bridge error",
                    &format!("Unexpected internal failure: {}", message),
                );
            }
        }
    }
}

/// The protocol URL to handle at startup, if any
///
/// In development mode the URL comes from `OUTLOOKBRIDGE_URL` (passed as
/// `dev_env`) and only when it carries the scheme prefix. Otherwise the first
/// startup argument with the prefix is used.
pub fn initial_protocol_arg(
    argv: &[String],
    dev_mode: bool,
    dev_env: Option<String>,
    prefix: &str,
) -> Option<String> {
    if dev_mode {
        dev_env.filter(|url| url.starts_with(prefix))
    } else {
        find_protocol_arg(argv, prefix)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
