//! Protocol handler self-registration
//!
//! On Windows the bridge registers itself as the handler for its scheme under
//! `HKCU\Software\Classes\<scheme>` using `reg.exe`. Other platforms declare
//! the handler in the application bundle at packaging time, so registration
//! is a no-op there.

use crate::compose::Platform;
use crate::{BridgeError, Result};
use async_trait::async_trait;
use automation::{Invocation, Runner};
use std::path::Path;
use std::sync::Arc;

/// Registers the running executable as the default handler for a scheme
#[async_trait]
pub trait ProtocolRegistrar: Send + Sync {
    /// Whether `exe` is already the registered handler for `scheme`
    async fn is_registered(&self, scheme: &str, exe: &Path) -> Result<bool>;

    /// Make `exe` the handler for `scheme`
    async fn register(&self, scheme: &str, exe: &Path) -> Result<()>;
}

/// Registration is handled outside the process
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

#[async_trait]
impl ProtocolRegistrar for NoopRegistrar {
    async fn is_registered(&self, _scheme: &str, _exe: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn register(&self, _scheme: &str, _exe: &Path) -> Result<()> {
        Ok(())
    }
}

/// Per-user registry registration through `reg.exe`
pub struct WindowsRegistrar {
    runner: Arc<dyn Runner>,
}

impl WindowsRegistrar {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }

    async fn reg(&self, args: Vec<String>) -> Result<String> {
        let invocation = Invocation::new("reg").args(args);
        let output = self.runner.run(&invocation).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(BridgeError::Registration(format!(
                "reg.exe failed: {}",
                output.combined().trim()
            )))
        }
    }
}

#[async_trait]
impl ProtocolRegistrar for WindowsRegistrar {
    async fn is_registered(&self, scheme: &str, exe: &Path) -> Result<bool> {
        let key = format!(r"{}\shell\open\command", class_key(scheme));
        // A missing key makes reg.exe exit non-zero
        match self.reg(vec!["query".into(), key, "/ve".into()]).await {
            Ok(stdout) => Ok(stdout.contains(&open_command(exe))),
            Err(BridgeError::Registration(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn register(&self, scheme: &str, exe: &Path) -> Result<()> {
        for args in registration_commands(scheme, exe) {
            self.reg(args).await?;
        }
        Ok(())
    }
}

fn class_key(scheme: &str) -> String {
    format!(r"HKCU\Software\Classes\{}", scheme)
}

/// Command the shell runs for a protocol URL: `"<exe>" "%1"`
pub fn open_command(exe: &Path) -> String {
    format!("\"{}\" \"%1\"", exe.display())
}

/// The `reg add` argument vectors that register `exe` for `scheme`
pub fn registration_commands(scheme: &str, exe: &Path) -> Vec<Vec<String>> {
    let key = class_key(scheme);
    let add = |key: String, rest: &[&str]| -> Vec<String> {
        let mut args = vec!["add".to_string(), key];
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    };
    let label = format!("URL:{} Protocol", scheme);
    let command = open_command(exe);

    vec![
        add(key.clone(), &["/ve", "/d", label.as_str(), "/f"]),
        add(key.clone(), &["/v", "URL Protocol", "/d", "", "/f"]),
        add(
            format!(r"{}\shell\open\command", key),
            &["/ve", "/d", command.as_str(), "/f"],
        ),
    ]
}

/// The registrar for `platform`
pub fn registrar_for(platform: Platform, runner: Arc<dyn Runner>) -> Arc<dyn ProtocolRegistrar> {
    match platform {
        Platform::Windows => Arc::new(WindowsRegistrar::new(runner)),
        Platform::Mac | Platform::Unsupported => Arc::new(NoopRegistrar),
    }
}

/// Register unless already registered; returns whether anything was written
pub async fn ensure_registered(
    registrar: &dyn ProtocolRegistrar,
    scheme: &str,
    exe: &Path,
) -> Result<bool> {
    if registrar.is_registered(scheme, exe).await? {
        tracing::debug!(scheme, exe = %exe.display(), "Protocol handler already registered");
        return Ok(false);
    }
    registrar.register(scheme, exe).await?;
    tracing::info!(scheme, exe = %exe.display(), "Registered protocol handler");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation::CommandOutput;
    use std::sync::Mutex;

    /// Fake reg.exe backed by a single stored command value
    #[derive(Default)]
    struct FakeReg {
        value: Mutex<Option<String>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Runner for FakeReg {
        async fn run(&self, invocation: &Invocation) -> automation::Result<CommandOutput> {
            let args = invocation.arguments().to_vec();
            self.calls.lock().unwrap().push(args.clone());
            let mut value = self.value.lock().unwrap();
            match args[0].as_str() {
                "query" => Ok(match value.as_ref() {
                    Some(v) => CommandOutput {
                        success: true,
                        stdout: format!("    (Default)    REG_SZ    {}\r\n", v),
                        ..Default::default()
                    },
                    None => CommandOutput {
                        success: false,
                        stderr: "ERROR: The system was unable to find the specified registry key or value.".into(),
                        ..Default::default()
                    },
                }),
                _ => {
                    if args[1].ends_with(r"\shell\open\command") {
                        *value = Some(args[4].clone());
                    }
                    Ok(CommandOutput {
                        success: true,
                        ..Default::default()
                    })
                }
            }
        }
    }

    #[test]
    fn test_registration_commands() {
        let exe = Path::new(r"C:\Apps\outlookbridge.exe");
        let commands = registration_commands("outlookbridge", exe);
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0],
            [
                "add",
                r"HKCU\Software\Classes\outlookbridge",
                "/ve",
                "/d",
                "URL:outlookbridge Protocol",
                "/f"
            ]
        );
        assert_eq!(commands[1][2..], ["/v", "URL Protocol", "/d", "", "/f"]);
        assert_eq!(
            commands[2][1],
            r"HKCU\Software\Classes\outlookbridge\shell\open\command"
        );
        assert_eq!(commands[2][4], open_command(exe));
    }

    #[tokio::test]
    async fn test_ensure_registered_is_idempotent() {
        let runner = Arc::new(FakeReg::default());
        let registrar = WindowsRegistrar::new(runner.clone());
        let exe = Path::new(r"C:\Apps\outlookbridge.exe");

        assert!(ensure_registered(&registrar, "outlookbridge", exe).await.unwrap());
        assert!(!ensure_registered(&registrar, "outlookbridge", exe).await.unwrap());

        let calls = runner.calls.lock().unwrap();
        let adds = calls.iter().filter(|c| c[0] == "add").count();
        assert_eq!(adds, 3);
    }

    #[tokio::test]
    async fn test_noop_registrar() {
        let registrar = registrar_for(Platform::Mac, Arc::new(FakeReg::default()));
        assert!(!ensure_registered(registrar.as_ref(), "outlookbridge", Path::new("x"))
            .await
            .unwrap());
    }
}
