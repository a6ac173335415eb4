//! macOS compose strategy: AppleScript through `osascript`

use super::{AttachmentResolver, ComposeStrategy, MailDraftRequest};
use crate::feedback::SharedFeedback;
use crate::Result;
use async_trait::async_trait;
use automation::escape::applescript_string;
use automation::{execute, AutomationResult, Invocation, Runner};
use std::path::PathBuf;
use std::sync::Arc;

pub struct MacStrategy {
    runner: Arc<dyn Runner>,
    resolver: Arc<AttachmentResolver>,
    feedback: SharedFeedback,
}

impl MacStrategy {
    pub fn new(
        runner: Arc<dyn Runner>,
        resolver: Arc<AttachmentResolver>,
        feedback: SharedFeedback,
    ) -> Self {
        Self {
            runner,
            resolver,
            feedback,
        }
    }
}

#[async_trait]
impl ComposeStrategy for MacStrategy {
    fn name(&self) -> &'static str {
        "mac"
    }

    async fn compose(&self, request: &MailDraftRequest) -> Result<AutomationResult> {
        if !request.attachments().is_empty() {
            self.feedback.log(&format!(
                "Downloading {} attachment(s)",
                request.attachments().len()
            ));
        }
        let resolved = self.resolver.resolve(request.attachments()).await?;
        let paths: Vec<PathBuf> = resolved.into_iter().map(|a| a.local_path).collect();

        let script = render_applescript(request, &paths);
        tracing::debug!(to = %request.to(), attachments = paths.len(), "Running Outlook AppleScript");

        let result = execute(self.runner.as_ref(), &Invocation::osascript(script)).await;
        if result.succeeded {
            self.feedback.log("Outlook draft opened");
        } else {
            self.feedback
                .log(&format!("Outlook automation failed: {}", result.diagnostic_message));
        }
        Ok(result)
    }
}

/// Outlook AppleScript that builds, opens and focuses one draft
///
/// Every interpolated value goes through [`applescript_string`].
pub fn render_applescript(request: &MailDraftRequest, attachments: &[PathBuf]) -> String {
    let mut script = String::from("tell application \"Microsoft Outlook\"\n");
    script.push_str(&format!(
        "  set newMessage to make new outgoing message with properties {{subject:\"{}\", content:\"{}\"}}\n",
        applescript_string(request.subject()),
        applescript_string(request.body())
    ));
    script.push_str(&format!(
        "  make new recipient at newMessage with properties {{email address:{{name:\"\", address:\"{}\"}}}}\n",
        applescript_string(request.to())
    ));
    for path in attachments {
        script.push_str(&format!(
            "  make new attachment at newMessage with properties {{file:(POSIX file \"{}\")}}\n",
            applescript_string(&path.to_string_lossy())
        ));
    }
    script.push_str("  open newMessage\n");
    script.push_str("  activate\n");
    script.push_str("end tell\n");
    script.push_str("return \"success\"\n");
    script
}
