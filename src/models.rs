use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TwelveLabsError};

/// Kind of asset being uploaded. Serialized as the `type` field of the
/// session request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Video,
    Image,
    Audio,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetType::Video => "video",
            AssetType::Image => "image",
            AssetType::Audio => "audio",
        })
    }
}

/// Body of `POST /assets/multipart-uploads`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUploadSessionRequest {
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: AssetType,
    pub total_size: u64,
}

/// A presigned URL for one chunk, as handed out by the server.
///
/// Fields are optional on the wire; entries missing an index or URL are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PresignedUrl {
    #[serde(default)]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    /// RFC 3339.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Raw `POST /assets/multipart-uploads` response. Validate with
/// [`UploadSession::try_from`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUploadSessionResponse {
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Bytes per chunk, decided by the server.
    #[serde(default)]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
    #[serde(default)]
    pub upload_urls: Option<Vec<PresignedUrl>>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// A validated upload session. Immutable for the lifetime of one upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    /// Known before any chunk is uploaded.
    pub asset_id: String,
    pub chunk_size: u64,
    /// Sparse; may not cover every chunk.
    pub initial_upload_urls: Vec<PresignedUrl>,
}

impl TryFrom<CreateUploadSessionResponse> for UploadSession {
    type Error = TwelveLabsError;

    fn try_from(resp: CreateUploadSessionResponse) -> Result<Self> {
        let upload_id = resp.upload_id.filter(|id| !id.is_empty());
        let chunk_size = resp.chunk_size.filter(|size| *size > 0);

        match (upload_id, chunk_size) {
            (Some(upload_id), Some(chunk_size)) => Ok(UploadSession {
                upload_id,
                asset_id: resp.asset_id.unwrap_or_default(),
                chunk_size,
                initial_upload_urls: resp.upload_urls.unwrap_or_default(),
            }),
            _ => Err(TwelveLabsError::SessionCreation(
                "missing upload_id or chunk_size".into(),
            )),
        }
    }
}

/// Proof that one chunk was durably stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompletedChunk {
    /// 1-based.
    pub chunk_index: u32,
    /// e.g. an ETag.
    pub proof: String,
    /// e.g. "etag".
    pub proof_type: String,
    pub chunk_size: u64,
}

/// `POST /assets/multipart-uploads/{upload_id}` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportChunkBatchResponse {
    /// Set once the server has finalized the asset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub processed_chunks: Option<u32>,
    #[serde(default)]
    pub duplicate_chunks: Option<u32>,
    #[serde(default)]
    pub total_completed: Option<u32>,
}

impl ReportChunkBatchResponse {
    /// The finalize URL, if the server returned a non-empty one.
    pub fn finalize_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Server-side state of one chunk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkStatus {
    pub index: u32,
    /// "pending", "completed", or "failed".
    pub status: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ChunkStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Snapshot passed to [`UploadOptions::on_progress`] after every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    pub total_chunks: u32,
    pub completed_chunks: u32,
    /// 0 to 100.
    pub percentage: f64,
    /// "uploading" or "completed".
    pub status: String,
}

impl UploadProgress {
    pub(crate) fn new(completed_chunks: u32, total_chunks: u32) -> Self {
        let percentage = if total_chunks == 0 {
            0.0
        } else {
            f64::from(completed_chunks) * 100.0 / f64::from(total_chunks)
        };
        let status = if completed_chunks >= total_chunks {
            "completed"
        } else {
            "uploading"
        };
        Self {
            total_chunks,
            completed_chunks,
            percentage,
            status: status.to_string(),
        }
    }
}

/// Returned by `wait_for_upload_completion`, and passed to
/// [`WaitOptions::on_status`] on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatus {
    /// "in_progress" or "completed".
    pub status: String,
    pub completed_chunks: u32,
    pub total_chunks: u32,
}

impl UploadStatus {
    pub fn is_complete(&self) -> bool {
        self.status == "completed"
    }
}

/// Returned by `upload_file` once every chunk has been reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub asset_id: String,
    /// Empty if the server is still processing the asset.
    pub asset_url: String,
}

/// Configuration for `upload_file`.
pub struct UploadOptions {
    /// Asset name. Default: the file's base name.
    pub filename: Option<String>,
    /// Default: video.
    pub file_type: AssetType,
    /// Chunks uploaded and reported per round trip. Default: 10.
    pub batch_size: usize,
    /// Concurrent chunk uploads. Default: 5.
    pub max_workers: usize,
    /// Extra attempts per chunk after the first. Default: 3.
    pub max_retries: u32,
    /// Base backoff, doubled on every retry. Default: 1s.
    pub retry_delay: Duration,
    /// Backoff ceiling. Default: 30s.
    pub max_retry_delay: Duration,
    /// Called once per reported batch.
    #[allow(clippy::type_complexity)]
    pub on_progress: Option<Box<dyn Fn(&UploadProgress) + Send + Sync>>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            filename: None,
            file_type: AssetType::Video,
            batch_size: 10,
            max_workers: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            on_progress: None,
        }
    }
}

/// Polling config for `wait_for_upload_completion`.
pub struct WaitOptions {
    /// Default: 5s.
    pub sleep_interval: Duration,
    /// Default: wait forever.
    pub max_wait_time: Option<Duration>,
    /// Called on each successful poll with the current status.
    #[allow(clippy::type_complexity)]
    pub on_status: Option<Box<dyn Fn(&UploadStatus) + Send + Sync>>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            sleep_interval: Duration::from_secs(5),
            max_wait_time: None,
            on_status: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal deserialization helpers (not part of the public API surface)
// ---------------------------------------------------------------------------

/// POST /assets/multipart-uploads/{upload_id}/presigned-urls response.
#[derive(Deserialize)]
pub(crate) struct PresignedUrlsResponse {
    #[serde(default)]
    pub upload_urls: Option<Vec<PresignedUrl>>,
}

/// GET /assets/multipart-uploads/{upload_id} response (one page).
#[derive(Deserialize)]
pub(crate) struct UploadStatusPage {
    #[serde(default)]
    pub data: Vec<ChunkStatus>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

#[derive(Deserialize)]
pub(crate) struct PageInfo {
    pub total_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn session_requires_upload_id_and_chunk_size() {
        let resp: CreateUploadSessionResponse = serde_json::from_value(json!({
            "upload_id": "up_1",
            "asset_id": "as_1",
        }))
        .unwrap();
        let err = UploadSession::try_from(resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionCreation);

        let resp: CreateUploadSessionResponse = serde_json::from_value(json!({
            "upload_id": "up_1",
            "asset_id": "as_1",
            "chunk_size": 0,
        }))
        .unwrap();
        assert!(UploadSession::try_from(resp).is_err());
    }

    #[test]
    fn session_keeps_sparse_initial_urls() {
        let resp: CreateUploadSessionResponse = serde_json::from_value(json!({
            "upload_id": "up_1",
            "asset_id": "as_1",
            "chunk_size": 5242880,
            "total_chunks": 4,
            "upload_urls": [
                { "chunk_index": 1, "url": "https://s3/1" },
                { "chunk_index": 2, "url": "https://s3/2", "expires_at": "2030-01-01T00:00:00Z" },
            ],
        }))
        .unwrap();
        let session = UploadSession::try_from(resp).unwrap();
        assert_eq!(session.upload_id, "up_1");
        assert_eq!(session.asset_id, "as_1");
        assert_eq!(session.chunk_size, 5_242_880);
        assert_eq!(session.initial_upload_urls.len(), 2);
    }

    #[test]
    fn request_serializes_type_field() {
        let req = CreateUploadSessionRequest {
            filename: "clip.mp4".into(),
            file_type: AssetType::Audio,
            total_size: 42,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "filename": "clip.mp4", "type": "audio", "total_size": 42 })
        );
    }

    #[test]
    fn progress_percentage_and_status() {
        let p = UploadProgress::new(2, 5);
        assert_eq!(p.percentage, 40.0);
        assert_eq!(p.status, "uploading");

        let p = UploadProgress::new(5, 5);
        assert_eq!(p.percentage, 100.0);
        assert_eq!(p.status, "completed");
    }

    #[test]
    fn empty_finalize_url_is_not_terminal() {
        let resp: ReportChunkBatchResponse =
            serde_json::from_value(json!({ "url": "", "processed_chunks": 2 })).unwrap();
        assert_eq!(resp.finalize_url(), None);

        let resp: ReportChunkBatchResponse =
            serde_json::from_value(json!({ "url": "https://assets/a" })).unwrap();
        assert_eq!(resp.finalize_url(), Some("https://assets/a"));
    }
}
