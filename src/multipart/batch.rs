use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::{Chunk, ChunkTransport};
use crate::errors::{Result, TwelveLabsError};
use crate::models::{CompletedChunk, UploadOptions};

const PROOF_TYPE_ETAG: &str = "etag";

/// Per-chunk retry schedule: the delay before retry `k` (1-based) is
/// `retry_delay * 2^(k-1)`, capped at `max_retry_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl RetryPolicy {
    /// Total attempts per chunk.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_retry_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&UploadOptions::default())
    }
}

impl From<&UploadOptions> for RetryPolicy {
    fn from(opts: &UploadOptions) -> Self {
        Self {
            max_retries: opts.max_retries,
            retry_delay: opts.retry_delay,
            max_retry_delay: opts.max_retry_delay,
        }
    }
}

/// Upload every chunk of one batch, at most `workers` permits' worth at a
/// time, retrying each chunk independently under `policy`.
///
/// Fails fast: the first chunk to exhaust its retries returns
/// [`TwelveLabsError::BatchAborted`] and the remaining in-flight uploads are
/// dropped. On success every chunk appears exactly once, in completion order.
pub async fn upload_batch<T>(
    transport: &T,
    chunks: &[Chunk],
    urls: &HashMap<u32, String>,
    workers: &Semaphore,
    policy: &RetryPolicy,
) -> Result<Vec<CompletedChunk>>
where
    T: ChunkTransport + ?Sized,
{
    let mut pending: FuturesUnordered<_> = chunks
        .iter()
        .map(|chunk| async move {
            let url = urls
                .get(&chunk.index)
                .ok_or(TwelveLabsError::MissingPresignedUrl {
                    chunk_index: chunk.index,
                })?;
            let _permit = workers.acquire().await.map_err(|_| {
                TwelveLabsError::chunk_upload(chunk.index, "worker pool closed", None)
            })?;
            upload_with_retry(transport, chunk, url, policy).await
        })
        .collect();

    let mut completed = Vec::with_capacity(chunks.len());
    while let Some(result) = pending.next().await {
        completed.push(result?);
    }
    Ok(completed)
}

async fn upload_with_retry<T>(
    transport: &T,
    chunk: &Chunk,
    url: &str,
    policy: &RetryPolicy,
) -> Result<CompletedChunk>
where
    T: ChunkTransport + ?Sized,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match transport.put_chunk(chunk, url).await {
            Ok(proof) => {
                debug!(chunk_index = chunk.index, attempt, "chunk uploaded");
                return Ok(CompletedChunk {
                    chunk_index: chunk.index,
                    proof,
                    proof_type: PROOF_TYPE_ETAG.to_string(),
                    chunk_size: chunk.size,
                });
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    chunk_index = chunk.index,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "chunk upload failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    chunk_index = chunk.index,
                    attempts = max_attempts,
                    error = %e,
                    "chunk upload failed, giving up"
                );
                return Err(TwelveLabsError::BatchAborted {
                    chunk_index: chunk.index,
                    attempts: max_attempts,
                    source: Box::new(e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::multipart::testing::{url_for, FakeTransport};

    fn chunks(range: std::ops::RangeInclusive<u32>) -> Vec<Chunk> {
        range
            .map(|index| Chunk {
                index,
                path: PathBuf::from(format!("chunk_{index:04}")),
                size: 8,
            })
            .collect()
    }

    fn urls(chunks: &[Chunk]) -> HashMap<u32, String> {
        chunks.iter().map(|c| (c.index, url_for(c.index))).collect()
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let p = RetryPolicy {
            max_retries: 10,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(5),
        };
        let delays: Vec<_> = (1..=5).map(|k| p.delay_for(k).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(p.delay_for(64), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_chunk_is_tried_max_retries_plus_one_times() {
        let transport = FakeTransport {
            fail_times: HashMap::from([(1, u32::MAX)]),
            ..Default::default()
        };
        let batch = chunks(1..=1);
        let workers = Semaphore::new(5);

        let err = upload_batch(&transport, &batch, &urls(&batch), &workers, &policy(3))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BatchAborted);
        assert_eq!(err.chunk_index(), Some(1));
        assert!(matches!(err, TwelveLabsError::BatchAborted { attempts: 4, .. }));

        let stamps = transport.attempts_for(1);
        assert_eq!(stamps.len(), 4);
        let gaps: Vec<_> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover() {
        let transport = FakeTransport {
            fail_times: HashMap::from([(2, 2), (4, 1)]),
            ..Default::default()
        };
        let batch = chunks(1..=5);
        let workers = Semaphore::new(5);

        let done = upload_batch(&transport, &batch, &urls(&batch), &workers, &policy(3))
            .await
            .unwrap();

        let indices: HashSet<_> = done.iter().map(|c| c.chunk_index).collect();
        assert_eq!(done.len(), 5);
        assert_eq!(indices, (1..=5).collect());
        assert_eq!(transport.attempts_for(2).len(), 3);
        let proof = done.iter().find(|c| c.chunk_index == 2).unwrap();
        assert_eq!(proof.proof, "etag-2");
        assert_eq!(proof.proof_type, "etag");
        assert_eq!(proof.chunk_size, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_etag_is_retried_then_fails() {
        let transport = FakeTransport {
            omit_etag: HashSet::from([3]),
            ..Default::default()
        };
        let batch = chunks(1..=3);
        let workers = Semaphore::new(2);

        let err = upload_batch(&transport, &batch, &urls(&batch), &workers, &policy(1))
            .await
            .unwrap_err();

        assert_eq!(err.chunk_index(), Some(3));
        assert_eq!(transport.attempts_for(3).len(), 2);
        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(cause.contains("no ETag received"), "{cause}");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_worker_permits() {
        let transport = FakeTransport {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let batch = chunks(1..=10);
        let workers = Semaphore::new(3);

        let done = upload_batch(&transport, &batch, &urls(&batch), &workers, &policy(0))
            .await
            .unwrap();

        assert_eq!(done.len(), 10);
        assert_eq!(
            transport
                .peak_in_flight
                .load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test]
    async fn chunk_without_url_fails_batch() {
        let transport = FakeTransport::default();
        let batch = chunks(1..=2);
        let mut map = urls(&batch);
        map.remove(&2);
        let workers = Semaphore::new(2);

        let err = upload_batch(&transport, &batch, &map, &workers, &policy(3))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingPresignedUrl);
        assert_eq!(err.chunk_index(), Some(2));
    }
}
