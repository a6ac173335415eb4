//! Configuration validation
//!
//! Collects every problem in a configuration instead of stopping at the first:
//! - Scheme is a valid URL scheme
//! - Timeouts and polling budgets are usable
//! - Fallback extension is a plain extension
//! - An explicit OUTLOOK.EXE path exists

use super::bridge_config::BridgeConfig;
use crate::BridgeError;

/// One problem found in a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationIssue>>;

/// Maximum activation attempts; more would keep an invocation busy for minutes
const MAX_ACTIVATION_ATTEMPTS: u32 = 100;

/// Validate a bridge configuration
pub fn validate_config(config: &BridgeConfig) -> ValidationResult {
    let mut issues = Vec::new();

    if !is_valid_scheme(&config.scheme) {
        issues.push(ValidationIssue::new(
            "scheme",
            format!(
                "Invalid URL scheme '{}': must start with a letter and contain only letters, digits, '+', '-' or '.'",
                config.scheme
            ),
        ));
    }

    let ext = &config.attachments.fallback_extension;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        issues.push(ValidationIssue::new(
            "attachments.fallback_extension",
            format!("Extension '{}' must be non-empty and alphanumeric", ext),
        ));
    }

    if config.attachments.download_timeout_secs == 0 {
        issues.push(ValidationIssue::new(
            "attachments.download_timeout_secs",
            "Download timeout must be greater than 0",
        ));
    }

    if config.automation.script_timeout_secs == Some(0) {
        issues.push(ValidationIssue::new(
            "automation.script_timeout_secs",
            "Script timeout must be greater than 0 (use null to disable it)",
        ));
    }

    let attempts = config.automation.activation_attempts;
    if attempts == 0 || attempts > MAX_ACTIVATION_ATTEMPTS {
        issues.push(ValidationIssue::new(
            "automation.activation_attempts",
            format!("Must be between 1 and {}", MAX_ACTIVATION_ATTEMPTS),
        ));
    }

    if let Some(ref path) = config.automation.outlook_path {
        if !path.is_file() {
            issues.push(ValidationIssue::new(
                "automation.outlook_path",
                format!("File not found: {}", path.display()),
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// RFC 3986 scheme syntax: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Validate and return a single `BridgeError::Config` listing every issue
pub fn validate_config_result(config: &BridgeConfig) -> crate::Result<()> {
    validate_config(config).map_err(|issues| {
        let messages: Vec<String> = issues.iter().map(|e| e.to_string()).collect();
        BridgeError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BridgeConfig::new()).is_ok());
    }

    #[test]
    fn test_scheme_syntax() {
        assert!(is_valid_scheme("outlookbridge"));
        assert!(is_valid_scheme("ms-outlook+x.1"));
        assert!(!is_valid_scheme(""));
        assert!(!is_valid_scheme("1bridge"));
        assert!(!is_valid_scheme("outlook bridge"));
        assert!(!is_valid_scheme("outlook://"));
    }

    #[test]
    fn test_collects_all_issues() {
        let mut config = BridgeConfig::new();
        config.scheme = "bad scheme".to_string();
        config.attachments.fallback_extension = ".tmp".to_string();
        config.automation.activation_attempts = 0;
        config.automation.script_timeout_secs = Some(0);

        let issues = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "scheme",
                "attachments.fallback_extension",
                "automation.script_timeout_secs",
                "automation.activation_attempts",
            ]
        );
    }

    #[test]
    fn test_outlook_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("OUTLOOK.EXE");

        let mut config = BridgeConfig::new();
        config.automation.outlook_path = Some(exe.clone());
        assert!(validate_config(&config).is_err());

        std::fs::write(&exe, b"").unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_result_message_lists_issues() {
        let mut config = BridgeConfig::new();
        config.attachments.download_timeout_secs = 0;
        let err = validate_config_result(&config).unwrap_err();
        assert!(err
            .to_string()
            .contains("attachments.download_timeout_secs: Download timeout must be greater than 0"));
    }
}
