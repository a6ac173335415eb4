//! outlookbridge configuration file handling
//!
//! Loads ~/.config/outlookbridge/config.yaml. Every field has a default, so a
//! missing file at the default location simply means "use the defaults".

use super::validation::validate_config_result;
use crate::Result;
use automation::ActivationPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Custom URL scheme handled by the bridge
pub const DEFAULT_SCHEME: &str = "outlookbridge";

/// Subject used when the link carries none
pub const DEFAULT_SUBJECT: &str = "no subject";

/// Attachment download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Shared per-user directory for downloaded attachments
    #[serde(default = "default_attachment_dir")]
    pub directory: PathBuf,

    /// Extension used when the URL path has none
    #[serde(default = "default_fallback_extension")]
    pub fallback_extension: String,

    /// Per-request download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Downloaded files older than this are swept at startup
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_attachment_dir() -> PathBuf {
    std::env::temp_dir().join("outlookbridge_attachments")
}

fn default_fallback_extension() -> String {
    "tmp".to_string()
}

fn default_download_timeout() -> u64 {
    60
}

fn default_retention_hours() -> u64 {
    24 * 7
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            directory: default_attachment_dir(),
            fallback_extension: default_fallback_extension(),
            download_timeout_secs: default_download_timeout(),
            retention_hours: default_retention_hours(),
        }
    }
}

/// External interpreter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Kill an interpreter that runs longer than this; `null` waits forever
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: Option<u64>,

    /// How long to wait on OUTLOOK.EXE before leaving it running detached
    #[serde(default = "default_launch_handoff")]
    pub launch_handoff_secs: u64,

    /// Window activation attempts after the draft is displayed
    #[serde(default = "default_activation_attempts")]
    pub activation_attempts: u32,

    /// Delay before each activation attempt, in milliseconds
    #[serde(default = "default_activation_delay")]
    pub activation_delay_ms: u64,

    /// Explicit path to OUTLOOK.EXE; skips installation detection
    #[serde(default)]
    pub outlook_path: Option<PathBuf>,
}

fn default_script_timeout() -> Option<u64> {
    Some(120)
}

fn default_launch_handoff() -> u64 {
    15
}

fn default_activation_attempts() -> u32 {
    10
}

fn default_activation_delay() -> u64 {
    500
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout(),
            launch_handoff_secs: default_launch_handoff(),
            activation_attempts: default_activation_attempts(),
            activation_delay_ms: default_activation_delay(),
            outlook_path: None,
        }
    }
}

impl AutomationConfig {
    pub fn script_timeout(&self) -> Option<Duration> {
        self.script_timeout_secs.map(Duration::from_secs)
    }

    pub fn launch_handoff(&self) -> Duration {
        Duration::from_secs(self.launch_handoff_secs)
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        ActivationPolicy {
            attempts: self.activation_attempts,
            delay: Duration::from_millis(self.activation_delay_ms),
        }
    }
}

/// User notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Show native modal dialogs for failures (otherwise log only)
    #[serde(default = "default_true")]
    pub dialogs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { dialogs: true }
    }
}

/// UI surface coordination
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Hold a cold-start link until an attached UI surface reports it has loaded
    #[serde(default)]
    pub wait_for_surface: bool,

    /// Exit once all queued events are handled instead of staying resident
    #[serde(default)]
    pub exit_when_idle: bool,
}

/// outlookbridge configuration
///
/// Represents the complete ~/.config/outlookbridge/config.yaml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// URL scheme to register and accept
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Subject used when the link has none
    #[serde(default = "default_subject")]
    pub default_subject: String,

    /// Development mode: no registration, link read from OUTLOOKBRIDGE_URL
    #[serde(default)]
    pub dev_mode: bool,

    /// Directory for the instance lock and endpoint record
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub ui: UiConfig,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_runtime_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("outlookbridge")
}

impl BridgeConfig {
    /// Create a configuration with every default applied
    pub fn new() -> Self {
        Self {
            scheme: default_scheme(),
            default_subject: default_subject(),
            dev_mode: false,
            runtime_dir: default_runtime_dir(),
            attachments: AttachmentConfig::default(),
            automation: AutomationConfig::default(),
            notifications: NotificationConfig::default(),
            ui: UiConfig::default(),
        }
    }

    /// Load from the default path, falling back to defaults when the file is absent
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::new());
        }
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::BridgeError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading outlookbridge configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        validate_config_result(&config)?;

        tracing::debug!(
            scheme = %config.scheme,
            dev_mode = config.dev_mode,
            attachment_dir = %config.attachments.directory.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/outlookbridge/config.yaml)
    pub fn default_path() -> PathBuf {
        // ~/.config on every platform, matching where users look for it
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("outlookbridge");
        path.push("config.yaml");
        path
    }

    /// `<scheme>://`, the prefix a protocol argument must start with
    pub fn scheme_prefix(&self) -> String {
        format!("{}://", self.scheme)
    }

    /// Path of the single-instance lock file
    pub fn lock_path(&self) -> PathBuf {
        self.runtime_dir.join("outlookbridge.lock")
    }

    /// Path of the primary instance's endpoint record
    pub fn instance_record_path(&self) -> PathBuf {
        self.runtime_dir.join("instance.json")
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
