//! outlookbridge - open reviewable Outlook drafts from `outlookbridge://` links
//!
//! A browser or another application hands off a "write this email" intent as
//! a protocol URL. The bridge parses it, downloads any attachments, and drives
//! the locally installed Outlook to open a pre-filled draft. It never sends
//! mail; the user reviews and sends from Outlook.
//!
//! # Architecture
//!
//! - **protocol**: Protocol URL parsing and validation
//! - **compose**: Mail draft requests, platform strategies (AppleScript on
//!   macOS, PowerShell/OUTLOOK.EXE on Windows), attachment downloads
//! - **instance**: Single-instance lock and second-launch forwarding
//! - **lifecycle**: Startup ordering and the event loop
//! - **registrar**: Protocol handler self-registration
//! - **feedback**: Log lines and notifications for the user
//! - **config**: YAML configuration and validation

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Components
pub mod compose;
pub mod events;
pub mod feedback;
pub mod instance;
pub mod lifecycle;
pub mod protocol;
pub mod registrar;

// Re-exports
pub use compose::{ComposeStrategy, Dispatcher, MailDraftRequest, Platform};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use lifecycle::{Collaborators, Lifecycle, RunOutcome};
pub use protocol::ProtocolParser;

pub use automation::{AutomationResult, Invocation, ProcessRunner, Runner};
