use std::io;
use std::path::Path;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::batch::{upload_batch, RetryPolicy};
use super::presigned::PresignedUrlCache;
use super::splitter::{split_file, ChunkSet};
use super::{ChunkTransport, UploadApi};
use crate::errors::{Result, TwelveLabsError};
use crate::models::{
    CreateUploadSessionRequest, UploadOptions, UploadProgress, UploadResult, UploadSession,
};

/// Drives one file through session creation, splitting, batched chunk
/// upload and reporting.
///
/// Batches run strictly one after another; chunks within a batch upload
/// concurrently. Every call to [`upload`](Self::upload) opens a brand-new
/// session.
pub struct MultipartUploader<'a, A: ?Sized, T: ?Sized> {
    api: &'a A,
    transport: &'a T,
}

impl<'a, A, T> MultipartUploader<'a, A, T>
where
    A: UploadApi + ?Sized,
    T: ChunkTransport + ?Sized,
{
    pub fn new(api: &'a A, transport: &'a T) -> Self {
        Self { api, transport }
    }

    /// Upload `path` and return the resulting asset.
    ///
    /// Returns early with the server's finalize URL as soon as a batch report
    /// carries one. If every batch is reported without one, the result has
    /// an empty `asset_url`. Chunk files are removed whatever the outcome.
    pub async fn upload(&self, path: &Path, opts: &UploadOptions) -> Result<UploadResult> {
        validate(opts)?;

        let total_size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(TwelveLabsError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TwelveLabsError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(TwelveLabsError::Io(e)),
        };

        let filename = opts.filename.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string())
        });

        info!(%filename, total_size, "creating upload session");
        let request = CreateUploadSessionRequest {
            filename,
            file_type: opts.file_type,
            total_size,
        };
        let session = UploadSession::try_from(self.api.create_upload_session(&request).await?)?;
        info!(
            upload_id = %session.upload_id,
            chunk_size = session.chunk_size,
            "upload session created"
        );

        let chunks = split_file(path, session.chunk_size).await?;
        info!(upload_id = %session.upload_id, chunks = chunks.len(), "file split into chunks");

        let result = self.upload_chunks(&session, &chunks, opts).await;
        chunks.cleanup().await;
        result
    }

    async fn upload_chunks(
        &self,
        session: &UploadSession,
        chunks: &ChunkSet,
        opts: &UploadOptions,
    ) -> Result<UploadResult> {
        let upload_id = session.upload_id.as_str();
        let total_chunks = chunks.len() as u32;
        let policy = RetryPolicy::from(opts);
        // No batch runs more than min(batch_size, chunk count) uploads at once.
        let permits = opts
            .max_workers
            .min(opts.batch_size)
            .min(chunks.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let workers = Semaphore::new(permits);
        let mut urls = PresignedUrlCache::from_initial(&session.initial_upload_urls);
        let mut completed_chunks = 0u32;

        for batch in chunks.chunks().chunks(opts.batch_size) {
            let indices: Vec<u32> = batch.iter().map(|c| c.index).collect();
            debug!(
                upload_id,
                first = indices.first().copied(),
                last = indices.last().copied(),
                "uploading batch"
            );

            let batch_urls = urls.ensure(self.api, upload_id, &indices).await?;
            let completed =
                upload_batch(self.transport, batch, &batch_urls, &workers, &policy).await?;

            let report = self
                .api
                .report_chunk_batch(upload_id, &completed)
                .await
                .inspect_err(|e| {
                    warn!(upload_id, error = %e, "failed to report chunk batch");
                })?;

            completed_chunks += completed.len() as u32;
            if let Some(ref cb) = opts.on_progress {
                cb(&UploadProgress::new(completed_chunks, total_chunks));
            }

            if let Some(url) = report.finalize_url() {
                info!(upload_id, asset_id = %session.asset_id, "upload finalized by server");
                return Ok(UploadResult {
                    asset_id: session.asset_id.clone(),
                    asset_url: url.to_string(),
                });
            }
        }

        info!(upload_id, asset_id = %session.asset_id, "all chunks uploaded");
        Ok(UploadResult {
            asset_id: session.asset_id.clone(),
            asset_url: String::new(),
        })
    }
}

fn validate(opts: &UploadOptions) -> Result<()> {
    if opts.batch_size == 0 {
        return Err(TwelveLabsError::InvalidArgument(
            "batch_size must be greater than 0".into(),
        ));
    }
    if opts.max_workers == 0 {
        return Err(TwelveLabsError::InvalidArgument(
            "max_workers must be greater than 0".into(),
        ));
    }
    Ok(())
}
