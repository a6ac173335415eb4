//! Error types for outlookbridge
//!
//! One enum covers every failure that can surface while handling a protocol
//! invocation, plus the ambient failures of startup (config, instance lock).
//! Uses thiserror for ergonomic error handling.

use crate::retry::{RetryDecision, Retryable};
use thiserror::Error;

/// Result type alias for outlookbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Comprehensive error type for outlookbridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing or invalid recipient
    #[error("Validation error: {0}")]
    Validation(String),

    /// Host OS has no compose strategy
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    /// One attachment could not be downloaded or written
    #[error("Attachment download failed for {url}: {reason}")]
    AttachmentDownload { url: String, reason: String },

    /// Interpreter or mail client reported failure
    #[error("Automation failed: {0}")]
    Automation(String),

    /// Malformed protocol URL or undecodable text
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Single-instance coordination errors
    #[error("Instance coordination error: {0}")]
    Instance(String),

    /// Protocol handler registration errors
    #[error("Registration error: {0}")]
    Registration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Automation runner errors
    #[error("Runner error: {0}")]
    Runner(#[from] automation::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl BridgeError {
    /// Build an attachment error for `url`
    pub fn download(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BridgeError::AttachmentDownload {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable name of the variant, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation",
            BridgeError::UnsupportedPlatform(_) => "unsupported_platform",
            BridgeError::AttachmentDownload { .. } => "attachment_download",
            BridgeError::Automation(_) => "automation",
            BridgeError::ProtocolParse(_) => "protocol_parse",
            BridgeError::Config(_) => "config",
            BridgeError::Instance(_) => "instance",
            BridgeError::Registration(_) => "registration",
            BridgeError::Io(_) => "io",
            BridgeError::Json(_) => "json",
            BridgeError::Yaml(_) => "yaml",
            BridgeError::Http(_) => "http",
            BridgeError::Runner(_) => "runner",
            BridgeError::Other(_) | BridgeError::Anyhow(_) => "other",
        }
    }

    /// Title for the modal notification shown to the user
    pub fn notification_title(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) | BridgeError::ProtocolParse(_) => "Invalid mail link",
            BridgeError::UnsupportedPlatform(_) => "Unsupported system",
            BridgeError::AttachmentDownload { .. } => "Attachment download failed",
            BridgeError::Automation(_) | BridgeError::Runner(_) => "Outlook automation failed",
            _ => "Outlook Bridge error",
        }
    }
}

impl Retryable for BridgeError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            // The primary may still be writing its record or binding its port
            BridgeError::Instance(_) => RetryDecision::Retry,
            BridgeError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                RetryDecision::Retry
            }
            BridgeError::Json(e) if e.is_eof() => RetryDecision::Retry,
            // Only when the request never left; a timed-out post may have been delivered
            BridgeError::Http(e) if e.is_connect() => RetryDecision::Retry,
            BridgeError::Http(e) => match e.status() {
                Some(status) if status.is_server_error() => RetryDecision::Retry,
                _ => RetryDecision::Stop,
            },
            _ => RetryDecision::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_names_url() {
        let err = BridgeError::download("https://ex.com/f.png", "404 Not Found");
        assert_eq!(
            err.to_string(),
            "Attachment download failed for https://ex.com/f.png: 404 Not Found"
        );
        assert_eq!(err.kind(), "attachment_download");
    }

    #[test]
    fn test_validation_title() {
        let err = BridgeError::Validation("missing recipient".into());
        assert_eq!(err.notification_title(), "Invalid mail link");
        assert_eq!(err.to_string(), "Validation error: missing recipient");
    }

    #[test]
    fn test_retry_decisions() {
        assert_eq!(
            BridgeError::Instance("no record".into()).retry_decision(),
            RetryDecision::Retry
        );
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(BridgeError::Io(missing).retry_decision(), RetryDecision::Retry);
        assert_eq!(
            BridgeError::Validation("x".into()).retry_decision(),
            RetryDecision::Stop
        );
    }
}
