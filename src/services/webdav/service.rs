use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::{Credentials, SyncConfig};
use crate::error::{Result, SyncError};
use crate::models::{DateWindow, Resource};
use crate::services::sync_planner::ContentFetcher;
use crate::webdav_xml_parser::parse_propfind_response;

use super::common::build_user_agent;
use super::crawler::FolderLister;

/// Size of the write buffer used while streaming downloads to disk
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
    <D:prop>
        <D:resourcetype/>
        <D:getcontentlength/>
        <D:getlastmodified/>
    </D:prop>
</D:propfind>"#;

/// Listing depth of a PROPFIND request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself
    Zero,
    /// The resource and its immediate children
    One,
}

impl Depth {
    fn header_value(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
        }
    }
}

/// WebDAV protocol client: PROPFIND listings and streamed downloads.
///
/// Requests are sent one at a time and never retried; any failure is
/// returned to the caller.
#[derive(Clone)]
pub struct WebDAVService {
    client: Client,
    credentials: Credentials,
    user_agent: String,
}

impl WebDAVService {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| SyncError::Transport {
            url: String::new(),
            status: None,
            message: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            credentials,
            user_agent: build_user_agent(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(config.credentials.clone(), config.timeout)
    }

    /// Sends a PROPFIND and returns the multistatus body; anything but 207 fails
    pub async fn propfind(&self, url: &str, depth: Depth) -> Result<String> {
        let method = Method::from_bytes(b"PROPFIND").map_err(|e| SyncError::Transport {
            url: url.to_string(),
            status: None,
            message: e.to_string(),
        })?;

        debug!("📤 PROPFIND {} (Depth: {})", url, depth.header_value());
        let started = Instant::now();

        let response = self
            .client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("User-Agent", &self.user_agent)
            .header("Depth", depth.header_value())
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| SyncError::Transport {
                url: url.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!("📥 PROPFIND {} answered {} in {}ms", url, status.as_u16(), started.elapsed().as_millis());

        if status != StatusCode::MULTI_STATUS {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Transport {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: describe_failure(status, &body),
            });
        }

        response.text().await.map_err(|e| SyncError::Transport {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })
    }

    /// Lists a folder and its immediate children
    pub async fn list_folder(&self, folder_url: &str) -> Result<String> {
        self.propfind(folder_url, Depth::One).await
    }

    /// Fetches the descriptor of a single remote file
    pub async fn stat(&self, url: &str, host_prefix: &str) -> Result<Resource> {
        let body = self.propfind(url, Depth::Zero).await?;
        let listing = parse_propfind_response(&body, host_prefix, &DateWindow::unbounded()).map_err(|e| {
            SyncError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        listing
            .into_accepted()
            .into_iter()
            .find(Resource::is_file)
            .ok_or_else(|| SyncError::Parse {
                url: url.to_string(),
                message: "listing does not describe a file".to_string(),
            })
    }

    /// Streams a remote file into `target`.
    ///
    /// The body is written to a hidden sibling file that replaces `target`
    /// only once the transfer completed, so an interrupted download never
    /// leaves a truncated file under the final name.
    pub async fn download_to_file(&self, url: &str, target: &Path) -> Result<u64> {
        debug!("⬇️ Downloading {} -> {}", url, target.display());
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| SyncError::Download {
                url: url.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Download {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: describe_failure(status, &body),
            });
        }

        let partial = partial_path(target);
        let written = match stream_to_file(url, response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    warn!("Failed to remove partial download {}: {}", partial.display(), cleanup);
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| SyncError::io(target, e))?;

        info!(
            "✅ Downloaded {} bytes to {} in {:.2}s",
            written,
            target.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(written)
    }
}

#[async_trait]
impl FolderLister for WebDAVService {
    async fn list_folder(&self, folder_url: &str) -> Result<String> {
        WebDAVService::list_folder(self, folder_url).await
    }
}

#[async_trait]
impl ContentFetcher for WebDAVService {
    async fn fetch(&self, resource_url: &str, target: &Path) -> Result<u64> {
        self.download_to_file(resource_url, target).await
    }
}

async fn stream_to_file(url: &str, response: reqwest::Response, partial: &Path) -> Result<u64> {
    let file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| SyncError::io(partial, e))?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SyncError::Download {
            url: url.to_string(),
            status: None,
            message: format!("connection lost after {} bytes: {}", written, e),
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(partial, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| SyncError::io(partial, e))?;
    Ok(written)
}

/// Hidden sibling of `target` that receives the body while it downloads
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    target.with_file_name(format!(".{}.nxget-part", name))
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    let preview: String = body.trim().chars().take(200).collect();
    if preview.is_empty() {
        reason.to_string()
    } else {
        format!("{} - {}", reason, preview)
    }
}
