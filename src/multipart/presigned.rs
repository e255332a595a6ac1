use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::UploadApi;
use crate::errors::{Result, TwelveLabsError};
use crate::models::PresignedUrl;

/// URLs expiring within this many seconds are treated as already expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedUrl {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => true,
        }
    }
}

/// Chunk index → presigned URL for one upload session.
///
/// Seeded from the session response and topped up on demand with a single
/// contiguous range request covering every missing or stale index.
#[derive(Debug, Default)]
pub struct PresignedUrlCache {
    entries: HashMap<u32, CachedUrl>,
}

impl PresignedUrlCache {
    /// An empty cache; every index will be fetched on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with the URLs handed out at session creation.
    pub fn from_initial<'a>(urls: impl IntoIterator<Item = &'a PresignedUrl>) -> Self {
        let mut cache = Self::new();
        cache.insert_all(urls);
        cache
    }

    /// Entries without an index or URL are skipped.
    pub fn insert_all<'a>(&mut self, urls: impl IntoIterator<Item = &'a PresignedUrl>) {
        for entry in urls {
            let (Some(index), Some(url)) = (entry.chunk_index, entry.url.as_ref()) else {
                continue;
            };
            let expires_at = entry
                .expires_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            self.entries.insert(
                index,
                CachedUrl {
                    url: url.clone(),
                    expires_at,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices among `indices` with no usable URL at `now`.
    pub fn missing(&self, indices: &[u32], now: DateTime<Utc>) -> Vec<u32> {
        indices
            .iter()
            .copied()
            .filter(|i| !self.entries.get(i).is_some_and(|e| e.is_fresh(now)))
            .collect()
    }

    /// Make sure every index in `indices` has a fresh URL, fetching
    /// `min(missing)..=max(missing)` in one request if needed, and return the
    /// URLs for exactly those indices.
    ///
    /// The expiry margin only decides what to fetch: a URL the server has
    /// just handed out is used even if it expires within the margin. Fetch
    /// errors propagate unchanged.
    pub async fn ensure<A>(
        &mut self,
        api: &A,
        upload_id: &str,
        indices: &[u32],
    ) -> Result<HashMap<u32, String>>
    where
        A: UploadApi + ?Sized,
    {
        let now = Utc::now();
        let missing = self.missing(indices, now);
        let mut refreshed = HashSet::new();

        if let (Some(&start), Some(&end)) = (missing.iter().min(), missing.iter().max()) {
            let count = end - start + 1;
            debug!(
                upload_id,
                start,
                end,
                missing = missing.len(),
                "fetching presigned URLs"
            );
            let fetched = api
                .get_additional_presigned_urls(upload_id, start, count)
                .await?;
            let in_range: Vec<&PresignedUrl> = fetched
                .iter()
                .filter(|u| u.url.is_some())
                .filter(|u| u.chunk_index.is_some_and(|i| (start..=end).contains(&i)))
                .collect();
            refreshed.extend(in_range.iter().filter_map(|u| u.chunk_index));
            self.insert_all(in_range);
        }

        indices
            .iter()
            .map(|&index| match self.entries.get(&index) {
                Some(entry) if entry.is_fresh(now) || refreshed.contains(&index) => {
                    Ok((index, entry.url.clone()))
                }
                _ => Err(TwelveLabsError::MissingPresignedUrl { chunk_index: index }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::multipart::testing::{url_for, FakeApi};

    fn entry(index: u32, expires_at: Option<&str>) -> PresignedUrl {
        PresignedUrl {
            chunk_index: Some(index),
            url: Some(url_for(index)),
            expires_at: expires_at.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn fetches_one_contiguous_range_for_sparse_gaps() {
        let api = FakeApi::new(4);
        let mut cache = PresignedUrlCache::from_initial(&[entry(1, None), entry(3, None)]);

        let urls = cache.ensure(&api, "up", &[1, 2, 3, 4, 5]).await.unwrap();

        assert_eq!(*api.url_fetches.lock().unwrap(), vec![(2, 4)]);
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[&5], url_for(5));
        assert_eq!(cache.len(), 5);
    }

    #[tokio::test]
    async fn no_fetch_when_all_present() {
        let api = FakeApi::new(4);
        let mut cache = PresignedUrlCache::from_initial(&[entry(1, None), entry(2, None)]);

        let urls = cache.ensure(&api, "up", &[1, 2]).await.unwrap();

        assert!(api.url_fetches.lock().unwrap().is_empty());
        assert_eq!(urls[&1], url_for(1));
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let api = FakeApi::new(4);
        let mut cache = PresignedUrlCache::from_initial(&[
            entry(1, Some("2000-01-01T00:00:00Z")),
            entry(2, Some("2999-01-01T00:00:00Z")),
        ]);

        cache.ensure(&api, "up", &[1, 2]).await.unwrap();

        assert_eq!(*api.url_fetches.lock().unwrap(), vec![(1, 1)]);
    }

    #[test]
    fn entries_without_index_or_url_are_ignored() {
        let cache = PresignedUrlCache::from_initial(&[
            PresignedUrl {
                chunk_index: None,
                url: Some("x".into()),
                expires_at: None,
            },
            PresignedUrl {
                chunk_index: Some(1),
                url: None,
                expires_at: None,
            },
        ]);
        assert!(cache.is_empty());
        assert_eq!(cache.missing(&[1], Utc::now()), vec![1]);
    }

    #[tokio::test]
    async fn short_lived_urls_from_a_fetch_are_used() {
        let mut api = FakeApi::new(4);
        api.url_ttl = Some(chrono::Duration::seconds(45));
        let mut cache = PresignedUrlCache::new();

        let urls = cache.ensure(&api, "up", &[1]).await.unwrap();

        assert_eq!(*api.url_fetches.lock().unwrap(), vec![(1, 1)]);
        assert_eq!(urls[&1], url_for(1));
        // Still inside the margin, so the next batch asks again.
        assert_eq!(cache.missing(&[1], Utc::now()), vec![1]);
    }

    struct ShortChangingApi(FakeApi);

    #[async_trait::async_trait]
    impl UploadApi for ShortChangingApi {
        async fn create_upload_session(
            &self,
            request: &crate::models::CreateUploadSessionRequest,
        ) -> Result<crate::models::CreateUploadSessionResponse> {
            self.0.create_upload_session(request).await
        }

        async fn get_additional_presigned_urls(
            &self,
            upload_id: &str,
            start: u32,
            count: u32,
        ) -> Result<Vec<PresignedUrl>> {
            let mut urls = self
                .0
                .get_additional_presigned_urls(upload_id, start, count)
                .await?;
            urls.pop();
            Ok(urls)
        }

        async fn report_chunk_batch(
            &self,
            upload_id: &str,
            completed_chunks: &[crate::models::CompletedChunk],
        ) -> Result<crate::models::ReportChunkBatchResponse> {
            self.0.report_chunk_batch(upload_id, completed_chunks).await
        }

        async fn get_upload_status(
            &self,
            upload_id: &str,
        ) -> Result<Vec<crate::models::ChunkStatus>> {
            self.0.get_upload_status(upload_id).await
        }
    }

    #[tokio::test]
    async fn omitted_index_is_an_error() {
        let api = ShortChangingApi(FakeApi::new(4));
        let mut cache = PresignedUrlCache::new();

        let err = cache.ensure(&api, "up", &[1, 2, 3]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingPresignedUrl);
        assert_eq!(err.chunk_index(), Some(3));
    }
}
