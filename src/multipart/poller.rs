use tokio::time::Instant;
use tracing::{debug, warn};

use super::UploadApi;
use crate::errors::{Result, TwelveLabsError};
use crate::models::{ChunkStatus, UploadStatus, WaitOptions};

/// Poll the chunk status of `upload_id` until every chunk is `completed`.
///
/// Fails immediately with [`TwelveLabsError::RemoteChunkFailure`] when any
/// chunk reports `failed`. Errors while fetching the status are logged and
/// retried after `sleep_interval`, bounded only by `max_wait_time`.
pub async fn wait_for_completion<A>(
    api: &A,
    upload_id: &str,
    opts: &WaitOptions,
) -> Result<UploadStatus>
where
    A: UploadApi + ?Sized,
{
    if opts.sleep_interval.is_zero() {
        return Err(TwelveLabsError::InvalidArgument(
            "sleep_interval must be greater than 0".into(),
        ));
    }

    let deadline = opts.max_wait_time.map(|max| (Instant::now() + max, max));

    loop {
        match api.get_upload_status(upload_id).await {
            Ok(chunks) => {
                let status = summarize(&chunks)?;
                debug!(
                    upload_id,
                    completed = status.completed_chunks,
                    total = status.total_chunks,
                    "upload status"
                );

                if let Some(ref cb) = opts.on_status {
                    cb(&status);
                }

                if status.is_complete() {
                    return Ok(status);
                }
            }
            Err(e) => {
                warn!(
                    upload_id,
                    kind = ?e.kind(),
                    error = %e,
                    "error checking upload status, retrying"
                );
            }
        }

        if let Some((at, max)) = deadline {
            if Instant::now() >= at {
                return Err(TwelveLabsError::Timeout(max));
            }
        }

        tokio::time::sleep(opts.sleep_interval).await;
    }
}

/// An empty chunk list counts as in progress.
fn summarize(chunks: &[ChunkStatus]) -> Result<UploadStatus> {
    let failed: Vec<u32> = chunks
        .iter()
        .filter(|c| c.is_failed())
        .map(|c| c.index)
        .collect();
    if !failed.is_empty() {
        return Err(TwelveLabsError::RemoteChunkFailure {
            chunk_indices: failed,
        });
    }

    let total_chunks = chunks.len() as u32;
    let completed_chunks = chunks.iter().filter(|c| c.is_completed()).count() as u32;
    let status = if total_chunks > 0 && completed_chunks == total_chunks {
        "completed"
    } else {
        "in_progress"
    };

    Ok(UploadStatus {
        status: status.to_string(),
        completed_chunks,
        total_chunks,
    })
}
