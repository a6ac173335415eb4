//! Host automation runner for outlookbridge
//!
//! A small, typed interface over the external programs that drive a desktop
//! mail client: `osascript` on macOS, `powershell` and `OUTLOOK.EXE` on Windows.
//!
//! # Example
//!
//! ```no_run
//! use automation::{execute, Invocation, ProcessRunner};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let runner = ProcessRunner::with_timeout(Some(Duration::from_secs(30)));
//! let script = r#"tell application "Microsoft Outlook" to activate"#;
//!
//! let result = execute(&runner, &Invocation::osascript(script)).await;
//! if !result.succeeded {
//!     eprintln!("automation failed: {}", result.diagnostic_message);
//! }
//! # }
//! ```

pub mod escape;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors that can occur when launching an automation program
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} is not installed or not in PATH")]
    NotInstalled(String),

    #[error("{program} did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("Failed to execute {program}: {reason}")]
    CommandFailed { program: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for automation operations
pub type Result<T> = std::result::Result<T, Error>;

/// What to do with a process that outlives its timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutAction {
    /// Kill the process and report a timeout
    #[default]
    Kill,

    /// Leave the process running and report success.
    ///
    /// Used for programs that may turn into the long-lived application
    /// itself, such as `OUTLOOK.EXE` when Outlook was not yet running.
    Detach,
}

/// A single external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    stdin: Option<String>,
    timeout: Option<Duration>,
    on_timeout: TimeoutAction,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
            on_timeout: TimeoutAction::Kill,
        }
    }

    /// Run an AppleScript by feeding it to `osascript -` on stdin
    pub fn osascript(script: impl Into<String>) -> Self {
        Self::new("osascript").arg("-").stdin(script)
    }

    /// Run a PowerShell script through `-EncodedCommand`
    ///
    /// Encoding sidesteps every layer of command-line quoting between us and
    /// the PowerShell parser.
    pub fn powershell(script: &str) -> Self {
        Self::new("powershell")
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-WindowStyle",
                "Hidden",
                "-EncodedCommand",
            ])
            .arg(escape::encode_powershell_command(script))
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Text written to the program's stdin before waiting for it
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Override the runner's default timeout for this invocation
    pub fn timeout(mut self, limit: Duration, action: TimeoutAction) -> Self {
        self.timeout = Some(limit);
        self.on_timeout = action;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_text(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn on_timeout(&self) -> TimeoutAction {
        self.on_timeout
    }

    /// Short program name for log lines and diagnostics
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured output of a finished (or detached) program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// The program was still running when its timeout expired and was left alone
    pub detached: bool,
}

impl CommandOutput {
    /// Get combined stdout and stderr output
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Outcome of one automation step, as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationResult {
    pub succeeded: bool,
    pub diagnostic_message: String,
}

impl AutomationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            diagnostic_message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            diagnostic_message: message.into(),
        }
    }
}

/// Something that can run an [`Invocation`]
///
/// [`ProcessRunner`] is the real implementation; tests substitute a recorder.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// A program that starts and exits non-zero is `Ok` with
    /// `success == false`; `Err` means it could not be run at all.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs invocations as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Runner that waits for programs indefinitely
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with a default timeout applied to every invocation
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let program = invocation.display_name();
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments())
            .stdin(if invocation.stdin_text().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(invocation.on_timeout() == TimeoutAction::Kill);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: no console flash for helper processes
            cmd.creation_flags(0x0800_0000);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotInstalled(program.clone())
            } else {
                Error::CommandFailed {
                    program: program.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if let Some(input) = invocation.stdin_text() {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let limit = invocation.timeout_override().or(self.timeout);
        let output = match limit {
            None => child.wait_with_output().await?,
            Some(after) => match tokio::time::timeout(after, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) if invocation.on_timeout() == TimeoutAction::Detach => {
                    tracing::debug!(program = %program, ?after, "Leaving long-running program detached");
                    return Ok(CommandOutput {
                        success: true,
                        detached: true,
                        ..Default::default()
                    });
                }
                Err(_) => return Err(Error::TimedOut { program, after }),
            },
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            detached: false,
        })
    }
}

/// Run an invocation and fold every outcome into an [`AutomationResult`].
///
/// Never retries: a failed compose step is reported, not repeated.
pub async fn execute(runner: &dyn Runner, invocation: &Invocation) -> AutomationResult {
    let program = invocation.display_name();
    match runner.run(invocation).await {
        Ok(output) if output.success => {
            let text = output.stdout.trim();
            if output.detached {
                AutomationResult::success(format!("{} handed off and still running", program))
            } else if text.is_empty() {
                AutomationResult::success(format!("{} completed", program))
            } else {
                AutomationResult::success(text.to_string())
            }
        }
        Ok(output) => {
            let detail = output.combined();
            let detail = detail.trim();
            AutomationResult::failure(if detail.is_empty() {
                format!("{} exited with a failure status", program)
            } else {
                format!("{} exited with a failure status: {}", program, detail)
            })
        }
        Err(e) => AutomationResult::failure(e.to_string()),
    }
}

/// Bounded polling used to bring the mail client's window to the front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Repeatedly run `probe` until it reports `True` or the attempts run out.
///
/// The probe is expected to print `True`/`False` (PowerShell's
/// `AppActivate` does). Waits `policy.delay` before every attempt, since the
/// window usually does not exist yet right after the display call. Returns
/// whether activation succeeded; failure here is never an error because the
/// draft has already been created.
pub async fn activate_with_retry(
    runner: &dyn Runner,
    probe: &Invocation,
    policy: ActivationPolicy,
) -> bool {
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.delay).await;
        match runner.run(probe).await {
            Ok(output) if output.success && output.stdout.trim().eq_ignore_ascii_case("true") => {
                tracing::debug!(attempt, "Mail client window activated");
                return true;
            }
            Ok(_) => tracing::debug!(attempt, "Mail client window not ready yet"),
            Err(e) => tracing::debug!(attempt, error = %e, "Activation probe failed"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedRunner {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(&self, _invocation: &Invocation) -> Result<CommandOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CommandOutput {
                success: true,
                stdout: if n == self.succeed_on { "True\r\n" } else { "False\r\n" }.to_string(),
                ..Default::default()
            })
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl Runner for FailingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            Err(Error::NotInstalled(invocation.display_name()))
        }
    }

    #[test]
    fn test_osascript_invocation_uses_stdin() {
        let inv = Invocation::osascript("return 1");
        assert_eq!(inv.program(), Path::new("osascript"));
        assert_eq!(inv.arguments(), ["-"]);
        assert_eq!(inv.stdin_text(), Some("return 1"));
    }

    #[test]
    fn test_powershell_invocation_is_encoded() {
        let inv = Invocation::powershell("'x'");
        let args = inv.arguments();
        assert_eq!(args[args.len() - 2], "-EncodedCommand");
        assert_eq!(args[args.len() - 1], escape::encode_powershell_command("'x'"));
        assert!(inv.stdin_text().is_none());
    }

    #[test]
    fn test_display_name_strips_directories() {
        let inv = Invocation::new(PathBuf::from("/opt/office/OUTLOOK.EXE"));
        assert_eq!(inv.display_name(), "OUTLOOK.EXE");
    }

    #[test]
    fn test_command_output_combined() {
        let output = CommandOutput {
            success: true,
            stdout: "output".to_string(),
            ..Default::default()
        };
        assert_eq!(output.combined(), "output");

        let output_with_err = CommandOutput {
            success: false,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            detached: false,
        };
        assert_eq!(output_with_err.combined(), "out\nerr");
    }

    #[tokio::test]
    async fn test_execute_maps_spawn_error_to_failure() {
        let result = execute(&FailingRunner, &Invocation::osascript("x")).await;
        assert!(!result.succeeded);
        assert!(result.diagnostic_message.contains("osascript"));
    }

    #[tokio::test]
    async fn test_activation_stops_on_first_success() {
        let runner = ScriptedRunner {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let policy = ActivationPolicy {
            attempts: 10,
            delay: Duration::from_millis(1),
        };
        assert!(activate_with_retry(&runner, &Invocation::new("probe"), policy).await);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_activation_gives_up_after_budget() {
        let runner = ScriptedRunner {
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
        };
        let policy = ActivationPolicy {
            attempts: 4,
            delay: Duration::from_millis(1),
        };
        assert!(!activate_with_retry(&runner, &Invocation::new("probe"), policy).await);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let runner = ProcessRunner::new();
        let inv = Invocation::new("sh").args(["-c", "cat; echo done >&2"]).stdin("hello");
        let output = runner.run(&inv).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr.trim(), "done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_reports_non_zero_exit() {
        let runner = ProcessRunner::new();
        let result = execute(&runner, &Invocation::new("sh").args(["-c", "echo boom >&2; exit 3"])).await;
        assert!(!result.succeeded);
        assert!(result.diagnostic_message.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_timeout_kills() {
        let runner = ProcessRunner::with_timeout(Some(Duration::from_millis(50)));
        let err = runner
            .run(&Invocation::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_timeout_detaches() {
        let runner = ProcessRunner::new();
        let inv = Invocation::new("sleep")
            .arg("1")
            .timeout(Duration::from_millis(50), TimeoutAction::Detach);
        let output = runner.run(&inv).await.unwrap();
        assert!(output.success);
        assert!(output.detached);
    }

    #[tokio::test]
    async fn test_missing_program_is_not_installed() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(&Invocation::new("definitely-not-a-real-program-4711"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInstalled(_)));
    }
}
