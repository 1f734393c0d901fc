//! YouTube Data API v3 resumable upload.

use crate::identity::IdentityRecord;
use crate::metadata::VideoMetadata;
use crate::oauth::OAuthClient;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::json;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
/// Must be a multiple of 256 KiB.
const CHUNK_SIZE: u64 = 8 * 1024 * 1024;
const CHUNK_TIMEOUT_S: u64 = 600;
const MAX_STALLED_CHUNKS: u32 = 5;

/// A remote video platform that accepts uploads on behalf of an identity.
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Returns a record with a fresh access token.
    async fn refresh(&self, record: &IdentityRecord) -> Result<IdentityRecord>;

    /// Uploads `video` and returns the platform's id for it.
    async fn upload(&self, record: &IdentityRecord, video: &Path, metadata: &VideoMetadata) -> Result<String>;
}

pub fn upload_body(metadata: &VideoMetadata) -> serde_json::Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.tags,
            "categoryId": metadata.category_id,
        },
        "status": {
            "privacyStatus": metadata.privacy_status,
        },
    })
}

/// Parses the `Range: bytes=0-N` header of a 308 reply into the next offset.
pub fn next_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.split('-').nth(1))
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct YouTubeClient {
    http: Client,
    oauth: OAuthClient,
    upload_url: String,
}

impl YouTubeClient {
    pub fn new(http: Client, oauth: OAuthClient) -> Self {
        Self {
            http,
            oauth,
            upload_url: UPLOAD_URL.to_string(),
        }
    }

    async fn start_session(&self, token: &str, total: u64, metadata: &VideoMetadata) -> Result<String> {
        let resp = self
            .http
            .post(&self.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Length", total.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&upload_body(metadata))
            .send()
            .await
            .context("YouTube upload session request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "YouTube refused upload session (HTTP {}): {}",
                status.as_u16(),
                raw.chars().take(400).collect::<String>()
            );
        }

        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("YouTube upload session has no Location header")
    }
}

#[async_trait]
impl VideoHost for YouTubeClient {
    async fn refresh(&self, record: &IdentityRecord) -> Result<IdentityRecord> {
        self.oauth.refresh(record).await
    }

    async fn upload(&self, record: &IdentityRecord, video: &Path, metadata: &VideoMetadata) -> Result<String> {
        let token = record.access_token().context("identity has no access token")?;
        let total = fs::metadata(video)
            .await
            .with_context(|| format!("Video missing: {}", video.display()))?
            .len();
        if total == 0 {
            anyhow::bail!("Video is empty: {}", video.display());
        }

        let session = self.start_session(token, total, metadata).await?;
        logi(format!("Upload session opened ({} bytes)", total));

        let mut file = fs::File::open(video).await?;
        let mut offset = 0u64;
        let mut stalled = 0u32;

        loop {
            let len = CHUNK_SIZE.min(total - offset);
            let mut buf = vec![0u8; len as usize];
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf).await?;

            let resp = self
                .http
                .put(&session)
                .bearer_auth(token)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", offset, offset + len - 1, total),
                )
                .body(buf)
                .timeout(std::time::Duration::from_secs(CHUNK_TIMEOUT_S))
                .send()
                .await
                .context("YouTube chunk upload failed")?;

            let status = resp.status();
            if status == StatusCode::PERMANENT_REDIRECT {
                let range = resp.headers().get(header::RANGE).and_then(|v| v.to_str().ok());
                let next = next_offset(range);
                if next <= offset {
                    stalled += 1;
                    logw(format!("Upload made no progress at byte {} ({} times)", offset, stalled));
                    if stalled >= MAX_STALLED_CHUNKS {
                        anyhow::bail!("Upload stalled at byte {}", offset);
                    }
                } else {
                    stalled = 0;
                }
                offset = next;
                if offset >= total {
                    anyhow::bail!("Server acknowledged all bytes but did not finish the upload");
                }
                continue;
            }

            let raw = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                anyhow::bail!(
                    "YouTube upload failed (HTTP {}): {}",
                    status.as_u16(),
                    raw.chars().take(400).collect::<String>()
                );
            }

            let body: serde_json::Value =
                serde_json::from_str(&raw).context("Failed to parse YouTube upload response")?;
            return body
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .context("YouTube upload response has no video id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_gives_next_offset() {
        assert_eq!(next_offset(Some("bytes=0-8388607")), 8_388_608);
        assert_eq!(next_offset(Some("bytes=0-0")), 1);
        assert_eq!(next_offset(None), 0);
        assert_eq!(next_offset(Some("garbage")), 0);
    }

    #[test]
    fn upload_body_carries_snippet_and_status() {
        let meta = VideoMetadata {
            title: "t".to_string(),
            description: "d".to_string(),
            tags: vec!["motivation".to_string(), "success".to_string()],
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        };
        let body = upload_body(&meta);
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["snippet"]["tags"][1], "success");
        assert_eq!(body["status"]["privacyStatus"], "public");
    }

    #[test]
    fn chunk_size_is_quarter_mebibyte_aligned() {
        assert_eq!(CHUNK_SIZE % (256 * 1024), 0);
    }
}
