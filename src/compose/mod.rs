//! Draft composition
//!
//! A validated [`MailDraftRequest`] is turned into an open, unsent draft in
//! the native mail client by a platform [`ComposeStrategy`]:
//!
//! 1. **Resolve** attachment URLs to local files ([`AttachmentResolver`])
//! 2. **Render** a platform automation script with every value escaped
//! 3. **Execute** it through an [`automation::Runner`]
//! 4. **Activate** the compose window where the platform needs help
//!
//! Strategies never send mail. The draft is always left for the user to review.

pub mod attachments;
pub mod mac;
pub mod windows;

pub use attachments::{extension_from_url, AttachmentResolver, ResolvedAttachment};
pub use mac::{render_applescript, MacStrategy};
pub use windows::{mailto_argument, outlook_command_args, render_powershell, OutlookLocator, WindowsStrategy};

use crate::config::AutomationConfig;
use crate::feedback::SharedFeedback;
use crate::{BridgeError, Result};
use async_trait::async_trait;
use automation::{AutomationResult, Runner};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Everything needed to open one draft
///
/// Constructed only through [`MailDraftRequest::new`], which guarantees a
/// non-empty recipient. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailDraftRequest {
    to: String,
    subject: String,
    body: String,
    attachments: Vec<String>,
}

impl MailDraftRequest {
    /// Build a request, rejecting a blank recipient
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        attachments: Vec<String>,
    ) -> Result<Self> {
        let to = to.into().trim().to_string();
        if to.is_empty() {
            return Err(BridgeError::Validation("missing recipient".to_string()));
        }
        Ok(Self {
            to,
            subject: subject.into(),
            body: body.into(),
            attachments,
        })
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Attachment URLs in the order they were given
    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }
}

/// The capability every platform provides: open a draft for review
#[async_trait]
pub trait ComposeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create and display the draft.
    ///
    /// `Err` means the operation could not get as far as the interpreter
    /// (for example an attachment failed to download). An interpreter that
    /// ran and failed is reported through `AutomationResult::succeeded`.
    async fn compose(&self, request: &MailDraftRequest) -> Result<AutomationResult>;
}

/// Host operating system, as far as composing mail is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Windows,
    Unsupported,
}

impl Platform {
    /// The platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unsupported
        }
    }

    /// macOS hands protocol URLs to a running application as an event
    /// rather than as a command-line argument.
    pub fn delivers_urls_as_events(&self) -> bool {
        matches!(self, Platform::Mac)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Mac => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::Unsupported => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Picks the compose strategy for a platform
///
/// A closed set: adding a platform means adding a strategy type and a match
/// arm here.
#[derive(Clone)]
pub struct Dispatcher {
    platform: Platform,
    runner: Arc<dyn Runner>,
    resolver: Arc<AttachmentResolver>,
    automation: AutomationConfig,
    feedback: SharedFeedback,
}

impl Dispatcher {
    pub fn new(
        platform: Platform,
        runner: Arc<dyn Runner>,
        resolver: Arc<AttachmentResolver>,
        automation: AutomationConfig,
        feedback: SharedFeedback,
    ) -> Self {
        Self {
            platform,
            runner,
            resolver,
            automation,
            feedback,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn resolver(&self) -> &AttachmentResolver {
        &self.resolver
    }

    /// Strategy for the configured platform, or `UnsupportedPlatform`
    pub fn select(&self) -> Result<Box<dyn ComposeStrategy>> {
        match self.platform {
            Platform::Mac => Ok(Box::new(MacStrategy::new(
                Arc::clone(&self.runner),
                Arc::clone(&self.resolver),
                Arc::clone(&self.feedback),
            ))),
            Platform::Windows => Ok(Box::new(WindowsStrategy::new(
                Arc::clone(&self.runner),
                Arc::clone(&self.resolver),
                Arc::clone(&self.feedback),
                &self.automation,
            ))),
            Platform::Unsupported => Err(BridgeError::UnsupportedPlatform(format!(
                "Outlook drafts cannot be created on {}",
                self.platform
            ))),
        }
    }
}
