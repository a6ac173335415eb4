//! Single-instance coordination
//!
//! The first launch takes an exclusive lock on `<runtime_dir>/outlookbridge.lock`
//! and becomes the PRIMARY. It serves a loopback endpoint and writes the
//! endpoint address to `<runtime_dir>/instance.json`.
//!
//! Every later launch finds the lock taken and becomes a SECONDARY. It reads
//! the record, posts its whole argument list to the primary and exits. The
//! primary may still be starting when a secondary looks for it, so reading
//! the record and posting are retried together with a short backoff.

mod lock;
mod server;

pub use lock::InstanceLock;
pub use server::{forward, ForwardedArgs, ForwardingServer};

use crate::config::BridgeConfig;
use crate::events::EventSender;
use crate::retry::{retry, RetryPolicy};
use crate::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a primary instance can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub pid: u32,
    pub addr: SocketAddr,
    pub started_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Err(BridgeError::Instance(format!(
                "Instance record {} is empty",
                path.display()
            )));
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temporary file so readers never see a partial record
    pub async fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Outcome of startup arbitration
pub enum InstanceRole {
    Primary(PrimaryInstance),
    Secondary(SecondaryInstance),
}

/// The lock, the endpoint and the record of the running primary
///
/// Dropping it stops the endpoint, removes the record and releases the lock.
pub struct PrimaryInstance {
    server: ForwardingServer,
    record: InstanceRecord,
    record_path: PathBuf,
    lock: InstanceLock,
}

impl PrimaryInstance {
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }
}

impl Drop for PrimaryInstance {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.record_path);
    }
}

/// Hands argument lists to the primary
pub struct SecondaryInstance {
    record_path: PathBuf,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl SecondaryInstance {
    /// Deliver `argv` to the primary instance
    pub async fn forward(&self, argv: &[String]) -> Result<()> {
        let record_path = self.record_path.as_path();
        let client = &self.client;

        let addr = retry(&self.policy, "forward to primary instance", || async move {
            let record = InstanceRecord::read(record_path).await?;
            forward(client, record.addr, argv).await?;
            Ok::<_, BridgeError>(record.addr)
        })
        .await?;

        tracing::info!(addr = %addr, argc = argv.len(), "Arguments forwarded to running instance");
        Ok(())
    }
}

/// Decides PRIMARY or SECONDARY at startup
#[derive(Debug, Clone)]
pub struct Coordinator {
    lock_path: PathBuf,
    record_path: PathBuf,
    policy: RetryPolicy,
}

impl Coordinator {
    pub fn new(lock_path: impl Into<PathBuf>, record_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            record_path: record_path.into(),
            policy: RetryPolicy::instance_handoff(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.lock_path(), config.instance_record_path())
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Take the lock and start serving, or find the primary
    ///
    /// A primary routes forwarded argument lists into `events`.
    pub async fn acquire(&self, events: EventSender) -> Result<InstanceRole> {
        let Some(lock) = InstanceLock::try_acquire(&self.lock_path)? else {
            tracing::info!(lock = %self.lock_path.display(), "Another instance is running");
            let client = reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()?;
            return Ok(InstanceRole::Secondary(SecondaryInstance {
                record_path: self.record_path.clone(),
                client,
                policy: self.policy.clone(),
            }));
        };

        let server = ForwardingServer::start(events).await?;
        let record = InstanceRecord {
            pid: std::process::id(),
            addr: server.addr(),
            started_at: Utc::now(),
        };
        record.write(&self.record_path).await?;
        tracing::info!(addr = %record.addr, pid = record.pid, "Running as primary instance");

        Ok(InstanceRole::Primary(PrimaryInstance {
            server,
            record,
            record_path: self.record_path.clone(),
            lock,
        }))
    }
}
