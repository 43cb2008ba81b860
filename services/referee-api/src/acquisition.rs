//! Model artifact download.
//!
//! A present file is trusted as-is. Transfers land in a `.part` sibling and
//! are renamed into place only once complete, so an interrupted download
//! never shows up as a model on the next start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use referee_core::METRICS;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
}

// MODEL_URL may carry a signed query string; errors never repeat it.
impl From<reqwest::Error> for AcquisitionError {
    fn from(e: reqwest::Error) -> Self { AcquisitionError::Http(e.without_url()) }
}

pub struct ModelAcquirer {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

/// Host part of a download URL, the only piece logged above debug level.
fn url_host(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| "<unparseable>".into())
}

pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

impl ModelAcquirer {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("referee-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client, timeout })
    }

    /// `true` when a model file is at `path` afterwards. Never retries.
    pub async fn ensure_model(&self, path: &Path, url: Option<&str>) -> bool {
        if path.exists() {
            info!(target: "referee::model", path=%path.display(), "model already exists");
            return true;
        }
        let Some(url) = url else {
            info!(target: "referee::model", path=%path.display(), "model not found locally and MODEL_URL not set");
            return false;
        };
        info!(target: "referee::model", host = %url_host(url), path=%path.display(), "downloading model");
        debug!(target: "referee::model", %url, "model download url");
        match self.download(url, path).await {
            Ok(bytes) => {
                info!(target: "referee::model", bytes, "model downloaded");
                true
            }
            Err(e) => {
                warn!(target: "referee::model", error=%e, "failed to download model");
                false
            }
        }
    }

    pub async fn download(&self, url: &str, path: &Path) -> Result<u64, AcquisitionError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(path);
        let transfer = self.fetch_to(url, &staging);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, transfer).await.unwrap_or(Err(AcquisitionError::Timeout(limit))),
            None => transfer.await,
        };
        match outcome {
            Ok(bytes) => {
                fs::rename(&staging, path).await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }

    async fn fetch_to(&self, url: &str, staging: &Path) -> Result<u64, AcquisitionError> {
        let mut resp = self.client.get(url).send().await?.error_for_status()?;
        let mut file = fs::File::create(staging).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            METRICS.model_download_bytes_total.inc_by(chunk.len() as u64);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}
