//! Attachment resolution
//!
//! Downloads attachment URLs into a shared per-user directory so the mail
//! client can attach them as local files.
//!
//! Downloads run one after another, in order. The first failure aborts the
//! whole resolution: files already fetched for that request are removed and
//! the error names the URL that failed. A draft is never opened with a
//! silently shortened attachment list.
//!
//! Files are kept after a successful compose (the mail client may read them
//! after the script returns) and swept by age on later startups.

use crate::config::AttachmentConfig;
use crate::{BridgeError, Result};
use chrono::Utc;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Longest extension taken from a URL; anything longer is not an extension
const MAX_EXTENSION_LEN: usize = 16;

/// A downloaded attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub source_url: String,
    pub local_path: PathBuf,
    /// Server reported a Content-Length
    pub size_known: bool,
}

/// Downloads attachment URLs to local files
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    client: reqwest::Client,
    directory: PathBuf,
    fallback_extension: String,
}

impl AttachmentResolver {
    pub fn new(config: &AttachmentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(concat!("outlookbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            directory: config.directory.clone(),
            fallback_extension: config.fallback_extension.clone(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Download every URL, preserving order
    pub async fn resolve(&self, urls: &[String]) -> Result<Vec<ResolvedAttachment>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.directory).await?;

        let mut resolved = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            match self.download(index, url).await {
                Ok(attachment) => {
                    tracing::debug!(
                        url = %url,
                        path = %attachment.local_path.display(),
                        size_known = attachment.size_known,
                        "Attachment downloaded"
                    );
                    resolved.push(attachment);
                }
                Err(e) => {
                    tracing::warn!(url = %url, index, error = %e, "Attachment download failed");
                    discard(&resolved).await;
                    return Err(e);
                }
            }
        }

        tracing::info!(count = resolved.len(), dir = %self.directory.display(), "Attachments resolved");
        Ok(resolved)
    }

    async fn download(&self, index: usize, url: &str) -> Result<ResolvedAttachment> {
        let parsed = Url::parse(url).map_err(|e| BridgeError::download(url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BridgeError::download(
                url,
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BridgeError::download(url, e))?;
        let size_known = response.content_length().is_some();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::download(url, e))?;

        let local_path = self
            .directory
            .join(self.file_name_for(index, url, Utc::now().timestamp_millis()));
        tokio::fs::write(&local_path, &bytes)
            .await
            .map_err(|e| BridgeError::download(url, e))?;

        Ok(ResolvedAttachment {
            source_url: url.to_string(),
            local_path,
            size_known,
        })
    }

    /// `file_<index>_<millis>.<ext>`, unique across overlapping invocations
    pub fn file_name_for(&self, index: usize, url: &str, millis: i64) -> String {
        let ext = extension_from_url(url).unwrap_or_else(|| self.fallback_extension.clone());
        format!("file_{}_{}.{}", index, millis, ext)
    }

    /// Delete files in the attachment directory older than `max_age`.
    ///
    /// Returns how many files were removed. A missing directory is not an
    /// error; individual files that cannot be removed are skipped.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Could not remove stale attachment")
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.directory.display(), "Swept stale attachments");
        }
        Ok(removed)
    }
}

async fn discard(attachments: &[ResolvedAttachment]) {
    for attachment in attachments {
        let _ = tokio::fs::remove_file(&attachment.local_path).await;
    }
}

/// Extension of the last path segment of `url`, without query or fragment
///
/// Only short ASCII-alphanumeric extensions are accepted, so the result is
/// always safe to use in a file name.
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}
