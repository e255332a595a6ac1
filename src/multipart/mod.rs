//! Chunked multipart upload.
//!
//! A file is split into server-sized chunks, each chunk is `PUT` to its own
//! presigned URL, and completed chunks are reported back to the API in
//! batches. [`MultipartUploader`] drives the whole flow; [`wait_for_completion`]
//! observes the server-side chunk state afterwards.
//!
//! The HTTP surface is abstracted behind [`UploadApi`] and [`ChunkTransport`].
//! [`Client`](crate::Client) implements both.

mod batch;
mod poller;
mod presigned;
mod session;
mod splitter;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    ChunkStatus, CompletedChunk, CreateUploadSessionRequest, CreateUploadSessionResponse,
    PresignedUrl, ReportChunkBatchResponse,
};

pub use batch::{upload_batch, RetryPolicy};
pub use poller::wait_for_completion;
pub use presigned::PresignedUrlCache;
pub use session::MultipartUploader;
pub use splitter::{split_file, Chunk, ChunkSet};

/// The multipart-upload endpoints of the Twelve Labs API.
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Open a new upload session.
    async fn create_upload_session(
        &self,
        request: &CreateUploadSessionRequest,
    ) -> Result<CreateUploadSessionResponse>;

    /// Fetch presigned URLs for chunks `start..start + count` (1-based).
    async fn get_additional_presigned_urls(
        &self,
        upload_id: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<PresignedUrl>>;

    /// Report a batch of durably stored chunks.
    async fn report_chunk_batch(
        &self,
        upload_id: &str,
        completed_chunks: &[CompletedChunk],
    ) -> Result<ReportChunkBatchResponse>;

    /// Server-side state of every chunk of the session.
    async fn get_upload_status(&self, upload_id: &str) -> Result<Vec<ChunkStatus>>;
}

/// Transfers one chunk's bytes to a presigned URL.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Upload `chunk` to `url` and return the storage integrity token (ETag).
    ///
    /// A missing token is an error even when the HTTP status was a success.
    async fn put_chunk(&self, chunk: &Chunk, url: &str) -> Result<String>;
}
