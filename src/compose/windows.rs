//! Windows compose strategy
//!
//! Two delivery paths, chosen by attachment count:
//!
//! - **More than one attachment**: a PowerShell script drives Outlook over COM,
//!   adding each downloaded file before displaying the draft.
//! - **Zero or one attachment**: `OUTLOOK.EXE` is launched directly with a
//!   mailto argument (`/c ipm.note /m ...`), plus `/a <file>` for a single
//!   attachment.
//!
//! Either way the compose window is then brought to the front with a bounded
//! `AppActivate` poll.

use super::{AttachmentResolver, ComposeStrategy, MailDraftRequest};
use crate::config::AutomationConfig;
use crate::feedback::SharedFeedback;
use crate::{BridgeError, Result};
use async_trait::async_trait;
use automation::escape::powershell_literal;
use automation::{
    activate_with_retry, execute, ActivationPolicy, AutomationResult, Invocation, Runner,
    TimeoutAction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const OUTLOOK_EXE: &str = "OUTLOOK.EXE";

/// Office releases, newest first: (registry version, install directory)
const OFFICE_VERSIONS: [(&str, &str); 4] = [
    ("16.0", "Office16"),
    ("15.0", "Office15"),
    ("14.0", "Office14"),
    ("12.0", "Office12"),
];

const ACTIVATE_PROBE: &str = "$shell = New-Object -ComObject WScript.Shell\n$shell.AppActivate('Outlook')";

pub struct WindowsStrategy {
    runner: Arc<dyn Runner>,
    resolver: Arc<AttachmentResolver>,
    feedback: SharedFeedback,
    outlook_path: Option<PathBuf>,
    locator: OutlookLocator,
    launch_handoff: Duration,
    activation: ActivationPolicy,
}

impl WindowsStrategy {
    pub fn new(
        runner: Arc<dyn Runner>,
        resolver: Arc<AttachmentResolver>,
        feedback: SharedFeedback,
        automation: &AutomationConfig,
    ) -> Self {
        Self {
            runner,
            resolver,
            feedback,
            outlook_path: automation.outlook_path.clone(),
            locator: OutlookLocator::from_env(),
            launch_handoff: automation.launch_handoff(),
            activation: automation.activation_policy(),
        }
    }

    /// Replace the install-directory search (tests point it at a temp dir)
    pub fn with_locator(mut self, locator: OutlookLocator) -> Self {
        self.locator = locator;
        self
    }

    fn outlook_exe(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.outlook_path {
            return Ok(path.clone());
        }
        self.locator
            .locate()
            .ok_or_else(|| BridgeError::Automation("Outlook installation not found".to_string()))
    }

    async fn compose_via_com(&self, request: &MailDraftRequest) -> Result<AutomationResult> {
        self.feedback.log(&format!(
            "Downloading {} attachments",
            request.attachments().len()
        ));
        let resolved = self.resolver.resolve(request.attachments()).await?;
        let paths: Vec<PathBuf> = resolved.into_iter().map(|a| a.local_path).collect();

        let script = render_powershell(request, &paths);
        tracing::debug!(to = %request.to(), attachments = paths.len(), "Running Outlook COM script");
        Ok(execute(self.runner.as_ref(), &Invocation::powershell(&script)).await)
    }

    async fn compose_via_command_line(
        &self,
        exe: &Path,
        request: &MailDraftRequest,
    ) -> Result<AutomationResult> {
        if !request.attachments().is_empty() {
            self.feedback.log("Downloading 1 attachment");
        }
        let resolved = self.resolver.resolve(request.attachments()).await?;
        let attachment = resolved.first().map(|a| a.local_path.as_path());

        let invocation = Invocation::new(exe)
            .args(outlook_command_args(request, attachment))
            .timeout(self.launch_handoff, TimeoutAction::Detach);
        tracing::debug!(exe = %exe.display(), attachment = attachment.is_some(), "Launching Outlook");
        Ok(execute(self.runner.as_ref(), &invocation).await)
    }
}

#[async_trait]
impl ComposeStrategy for WindowsStrategy {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn compose(&self, request: &MailDraftRequest) -> Result<AutomationResult> {
        let exe = self.outlook_exe()?;
        tracing::debug!(exe = %exe.display(), "Using Outlook installation");

        let result = if request.attachments().len() > 1 {
            self.compose_via_com(request).await?
        } else {
            self.compose_via_command_line(&exe, request).await?
        };

        if !result.succeeded {
            self.feedback
                .log(&format!("Outlook automation failed: {}", result.diagnostic_message));
            return Ok(result);
        }

        self.feedback.log("Outlook draft opened");
        let probe = Invocation::powershell(ACTIVATE_PROBE);
        if !activate_with_retry(self.runner.as_ref(), &probe, self.activation).await {
            tracing::debug!(
                attempts = self.activation.attempts,
                "Outlook window could not be brought to the front"
            );
        }
        Ok(result)
    }
}

/// PowerShell script that builds and displays a draft over COM
///
/// Values are single-quoted literals, so `$` and backticks in user text are
/// never expanded.
pub fn render_powershell(request: &MailDraftRequest, attachments: &[PathBuf]) -> String {
    let mut script = String::from("$ErrorActionPreference = 'Stop'\n");
    script.push_str("$outlook = New-Object -ComObject Outlook.Application\n");
    script.push_str("$mail = $outlook.CreateItem(0)\n");
    script.push_str(&format!("$mail.To = {}\n", powershell_literal(request.to())));
    script.push_str(&format!(
        "$mail.Subject = {}\n",
        powershell_literal(request.subject())
    ));
    script.push_str(&format!(
        "$mail.HTMLBody = {}\n",
        powershell_literal(request.body())
    ));
    for path in attachments {
        script.push_str(&format!(
            "$mail.Attachments.Add({}) | Out-Null\n",
            powershell_literal(&path.to_string_lossy())
        ));
    }
    script.push_str("$mail.Display()\n");
    script.push_str("'success'\n");
    script
}

/// `mailto:` argument for `OUTLOOK.EXE /m`
pub fn mailto_argument(request: &MailDraftRequest) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        urlencoding::encode(request.to()).replace("%40", "@"),
        urlencoding::encode(request.subject()),
        urlencoding::encode(request.body())
    )
}

/// Argument vector for launching `OUTLOOK.EXE` with a new draft
pub fn outlook_command_args(request: &MailDraftRequest, attachment: Option<&Path>) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    match attachment {
        Some(path) => {
            args.push("/a".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        None => {
            args.push("/c".to_string());
            args.push("ipm.note".to_string());
        }
    }
    args.push("/m".to_string());
    args.push(mailto_argument(request));
    args
}

/// Searches the usual Office install locations for `OUTLOOK.EXE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlookLocator {
    bases: Vec<PathBuf>,
}

impl OutlookLocator {
    /// Standard install roots plus the ones named by the environment
    pub fn from_env() -> Self {
        let mut bases = vec![
            PathBuf::from(r"C:\Program Files\Microsoft Office"),
            PathBuf::from(r"C:\Program Files (x86)\Microsoft Office"),
        ];
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            bases.push(PathBuf::from(local).join("Microsoft").join("Office"));
        }
        for var in ["ProgramW6432", "ProgramFiles(x86)"] {
            if let Some(root) = std::env::var_os(var) {
                bases.push(PathBuf::from(root).join("Microsoft Office"));
            }
        }
        Self { bases }
    }

    pub fn with_bases(bases: Vec<PathBuf>) -> Self {
        Self { bases }
    }

    /// Every path probed, in probe order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(self.bases.len() * OFFICE_VERSIONS.len() * 3);
        for base in &self.bases {
            for (reg, dir) in OFFICE_VERSIONS {
                candidates.push(base.join("root").join(dir).join(OUTLOOK_EXE));
                candidates.push(base.join(dir).join(OUTLOOK_EXE));
                candidates.push(base.join(reg).join("Outlook").join(OUTLOOK_EXE));
            }
        }
        candidates
    }

    /// First candidate that exists
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }
}
