//! Configuration system
//!
//! Loads ~/.config/outlookbridge/config.yaml with support for:
//! - A custom URL scheme and default subject
//! - Attachment download and retention settings
//! - Interpreter timeouts and window-activation polling
//! - Notification and UI-surface behavior

mod bridge_config;
pub mod validation;

pub use bridge_config::{
    AttachmentConfig, AutomationConfig, BridgeConfig, NotificationConfig, UiConfig,
    DEFAULT_SCHEME, DEFAULT_SUBJECT,
};
pub use validation::{validate_config, validate_config_result, ValidationIssue};
