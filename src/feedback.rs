//! User-facing feedback
//!
//! Two one-way channels reach the user: a stream of log lines for whatever UI
//! surface is attached, and modal notifications for failures when nothing
//! richer exists. Both are fire-and-forget.

use crate::compose::Platform;
use automation::escape::{applescript_string, powershell_literal};
use automation::{Invocation, Runner, TimeoutAction};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long a dialog process is watched before it is left open on its own
const DIALOG_HANDOFF: Duration = Duration::from_secs(2);

/// Sink for human-readable progress and failure reports
pub trait Feedback: Send + Sync {
    /// One log line for the UI surface
    fn log(&self, line: &str);

    /// A modal notification the user has to see
    fn notify(&self, title: &str, message: &str);

    /// Background work started by `notify` that has to finish before exit
    fn take_outstanding(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

pub type SharedFeedback = Arc<dyn Feedback>;

/// Feedback that only writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn log(&self, line: &str) {
        tracing::info!(target: "outlookbridge::feedback", "{}", line);
    }

    fn notify(&self, title: &str, message: &str) {
        tracing::error!(target: "outlookbridge::feedback", title, "{}", message);
    }
}

/// Feedback that shows native dialogs for notifications
///
/// Dialogs run on a background task so a dialog waiting for "OK" never holds
/// up the next protocol invocation. The dialog process outlives the bridge:
/// it is never killed, only left running once [`DIALOG_HANDOFF`] passes.
pub struct DialogFeedback {
    runner: Arc<dyn Runner>,
    platform: Platform,
    outstanding: Mutex<Vec<JoinHandle<()>>>,
}

impl DialogFeedback {
    pub fn new(runner: Arc<dyn Runner>, platform: Platform) -> Self {
        Self {
            runner,
            platform,
            outstanding: Mutex::new(Vec::new()),
        }
    }
}

impl Feedback for DialogFeedback {
    fn log(&self, line: &str) {
        LogFeedback.log(line);
    }

    fn notify(&self, title: &str, message: &str) {
        LogFeedback.notify(title, message);

        let Some(invocation) = dialog_invocation(self.platform, title, message) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime, dialog skipped");
            return;
        };
        let runner = Arc::clone(&self.runner);
        let task = handle.spawn(async move {
            if let Err(e) = runner.run(&invocation).await {
                tracing::warn!(error = %e, "Failed to show notification dialog");
            }
        });

        match self.outstanding.lock() {
            Ok(mut outstanding) => {
                outstanding.retain(|task| !task.is_finished());
                outstanding.push(task);
            }
            Err(_) => tracing::warn!("Dialog task list poisoned, not tracking dialog"),
        }
    }

    fn take_outstanding(&self) -> Vec<JoinHandle<()>> {
        match self.outstanding.lock() {
            Ok(mut outstanding) => std::mem::take(&mut *outstanding),
            Err(_) => Vec::new(),
        }
    }
}

/// Native modal dialog for the platform, if it has one we can drive
///
/// The dialog waits for the user, so it is detached rather than killed when
/// it stays open past the handoff.
pub fn dialog_invocation(platform: Platform, title: &str, message: &str) -> Option<Invocation> {
    let invocation = match platform {
        Platform::Mac => Some(Invocation::osascript(format!(
            "display dialog \"{}\" with title \"{}\" buttons {{\"OK\"}} default button \"OK\" with icon caution",
            applescript_string(message),
            applescript_string(title)
        ))),
        Platform::Windows => Some(Invocation::powershell(&format!(
            "Add-Type -AssemblyName PresentationFramework\n[System.Windows.MessageBox]::Show({}, {}) | Out-Null",
            powershell_literal(message),
            powershell_literal(title)
        ))),
        Platform::Unsupported => None,
    }?;
    Some(invocation.timeout(DIALOG_HANDOFF, TimeoutAction::Detach))
}

/// A line of feedback forwarded to an attached UI surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Log(String),
    Notify { title: String, message: String },
}

/// Feedback that forwards everything to a UI surface over a channel
///
/// Lines are also logged, so nothing is lost if the surface goes away.
#[derive(Debug, Clone)]
pub struct ChannelFeedback {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
}

impl ChannelFeedback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedbackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Feedback for ChannelFeedback {
    fn log(&self, line: &str) {
        LogFeedback.log(line);
        let _ = self.tx.send(FeedbackEvent::Log(line.to_string()));
    }

    fn notify(&self, title: &str, message: &str) {
        LogFeedback.notify(title, message);
        let _ = self.tx.send(FeedbackEvent::Notify {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_dialog_escapes_message() {
        let inv = dialog_invocation(Platform::Mac, "Error", "bad \"link\"").unwrap();
        let script = inv.stdin_text().unwrap();
        assert!(script.contains(r#"display dialog "bad \"link\"""#));
        assert!(script.contains(r#"with title "Error""#));
    }

    #[test]
    fn test_windows_dialog_is_powershell() {
        let inv = dialog_invocation(Platform::Windows, "Error", "it's broken").unwrap();
        assert_eq!(inv.display_name(), "powershell");
    }

    #[test]
    fn test_dialogs_are_detached_not_killed() {
        for platform in [Platform::Mac, Platform::Windows] {
            let inv = dialog_invocation(platform, "Error", "missing recipient").unwrap();
            assert_eq!(inv.on_timeout(), TimeoutAction::Detach);
            assert_eq!(inv.timeout_override(), Some(DIALOG_HANDOFF));
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        runs: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Runner for CountingRunner {
        async fn run(&self, _invocation: &Invocation) -> automation::Result<automation::CommandOutput> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(automation::CommandOutput {
                success: true,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_dialog_tasks_are_handed_back() {
        let runner = Arc::new(CountingRunner::default());
        let feedback = DialogFeedback::new(runner.clone(), Platform::Mac);
        feedback.notify("Invalid mail link", "missing recipient");
        feedback.notify("Unsupported system", "no Outlook here");

        let outstanding = feedback.take_outstanding();
        assert_eq!(outstanding.len(), 2);
        for task in outstanding {
            task.await.unwrap();
        }
        assert_eq!(runner.runs.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(feedback.take_outstanding().is_empty());
    }

    #[test]
    fn test_log_feedback_has_nothing_outstanding() {
        LogFeedback.notify("t", "m");
        assert!(LogFeedback.take_outstanding().is_empty());
    }

    #[test]
    fn test_unsupported_has_no_dialog() {
        assert!(dialog_invocation(Platform::Unsupported, "t", "m").is_none());
    }

    #[test]
    fn test_channel_feedback_forwards() {
        let (feedback, mut rx) = ChannelFeedback::new();
        feedback.log("hello");
        feedback.notify("Oops", "missing recipient");
        assert_eq!(rx.try_recv().unwrap(), FeedbackEvent::Log("hello".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            FeedbackEvent::Notify {
                title: "Oops".into(),
                message: "missing recipient".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
