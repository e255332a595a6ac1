use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ETAG};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::errors::{Result, TwelveLabsError};
use crate::models::{
    ChunkStatus, CompletedChunk, CreateUploadSessionRequest, CreateUploadSessionResponse,
    PresignedUrl, PresignedUrlsResponse, ReportChunkBatchResponse, UploadOptions, UploadResult,
    UploadStatus, UploadStatusPage, WaitOptions,
};
use crate::multipart::{self, Chunk, ChunkTransport, MultipartUploader, UploadApi};

const DEFAULT_BASE_URL: &str = "https://api.twelvelabs.io/v1.3";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(300);
const STATUS_PAGE_LIMIT: u32 = 50;

const API_KEY_ENV: &str = "TWELVE_LABS_API_KEY";
const BASE_URL_ENV: &str = "TWELVELABS_BASE_URL";
const API_KEY_HEADER: &str = "x-api-key";

/// Builder for constructing a [`Client`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use twelvelabs::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> twelvelabs::Result<()> {
/// let client = ClientBuilder::new()
///     .api_key("tlk_abc123")
///     .max_retries(5)
///     .chunk_timeout(Duration::from_secs(600))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    max_retries: u32,
    timeout: Duration,
    chunk_timeout: Duration,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    /// Set the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the base URL. Falls back to `TWELVELABS_BASE_URL`, then to
    /// `https://api.twelvelabs.io/v1.3`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the maximum number of retries for transient API errors (defaults to 3).
    ///
    /// Chunk transfers have their own retry policy, see [`UploadOptions`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the timeout for JSON API requests (defaults to 60 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Set the timeout for a single chunk transfer (defaults to 300 seconds).
    pub fn chunk_timeout(mut self, d: Duration) -> Self {
        self.chunk_timeout = d;
        self
    }

    /// Build the [`Client`].
    ///
    /// If no API key was set via [`api_key`](Self::api_key), the builder will
    /// attempt to read the `TWELVE_LABS_API_KEY` environment variable.
    ///
    /// Returns [`TwelveLabsError::Authentication`] if no key is available.
    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| TwelveLabsError::Authentication {
                message: "API key is required. Pass it to ClientBuilder::api_key() \
                          or set the TWELVE_LABS_API_KEY environment variable."
                    .into(),
            })?;

        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(TwelveLabsError::Http)?;

        Ok(Client {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
            max_retries: self.max_retries,
            chunk_timeout: self.chunk_timeout,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The Twelve Labs API client.
///
/// Use [`Client::new`] for quick construction or [`ClientBuilder`] for full control.
///
/// # Example
///
/// ```no_run
/// use twelvelabs::Client;
///
/// # async fn example() -> twelvelabs::Result<()> {
/// let client = Client::new("tlk_abc123");
///
/// let result = client.upload_file("video.mp4", None).await?;
/// println!("asset {}", result.asset_id);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    max_retries: u32,
    chunk_timeout: Duration,
}

impl Client {
    /// Create a new client with the given API key and default settings.
    ///
    /// For customization, use [`ClientBuilder`] instead.
    pub fn new(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            http,
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    /// Upload a local file as an asset using chunked multipart upload.
    ///
    /// Creates an upload session, splits the file into server-sized chunks
    /// next to the source file, uploads the chunks batch by batch with
    /// bounded concurrency and per-chunk retry, and reports each batch.
    ///
    /// The returned [`UploadResult::asset_url`] is empty when the server had
    /// not finalized the asset by the time the last batch was reported; use
    /// [`wait_for_upload_completion`](Self::wait_for_upload_completion) to
    /// follow it.
    ///
    /// # Errors
    ///
    /// - [`TwelveLabsError::FileNotFound`] if the file does not exist.
    /// - [`TwelveLabsError::SessionCreation`] if the session response is incomplete.
    /// - [`TwelveLabsError::Split`] if the file is empty or cannot be chunked.
    /// - [`TwelveLabsError::BatchAborted`] if a chunk exhausts its retries.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        opts: Option<UploadOptions>,
    ) -> Result<UploadResult> {
        let opts = opts.unwrap_or_default();
        MultipartUploader::new(self, self)
            .upload(path.as_ref(), &opts)
            .await
    }

    /// Upload several files one after another, each in its own session.
    ///
    /// A failure does not stop the remaining uploads; every file gets its own
    /// entry in the returned list, in input order.
    pub async fn upload_files<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
        opts: &UploadOptions,
    ) -> Vec<Result<UploadResult>> {
        let uploader = MultipartUploader::new(self, self);
        let mut results = Vec::new();
        for path in paths {
            results.push(uploader.upload(path.as_ref(), opts).await);
        }
        results
    }

    /// Poll an upload's chunk status until every chunk is completed.
    ///
    /// # Errors
    ///
    /// - [`TwelveLabsError::RemoteChunkFailure`] if the server reports failed chunks.
    /// - [`TwelveLabsError::Timeout`] if `max_wait_time` elapses first.
    pub async fn wait_for_upload_completion(
        &self,
        upload_id: &str,
        opts: Option<WaitOptions>,
    ) -> Result<UploadStatus> {
        let opts = opts.unwrap_or_default();
        multipart::wait_for_completion(self, upload_id, &opts).await
    }

    /// Open a multipart upload session.
    pub async fn create_upload_session(
        &self,
        request: &CreateUploadSessionRequest,
    ) -> Result<CreateUploadSessionResponse> {
        let body = json!({
            "filename": request.filename,
            "type": request.file_type,
            "total_size": request.total_size,
        });
        self.request(Method::POST, "/assets/multipart-uploads", Some(body))
            .await
    }

    /// Request presigned URLs for chunks `start..start + count` (1-based).
    pub async fn get_additional_presigned_urls(
        &self,
        upload_id: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<PresignedUrl>> {
        let body = json!({ "start": start, "count": count });
        let resp: PresignedUrlsResponse = self
            .request(
                Method::POST,
                &format!("/assets/multipart-uploads/{upload_id}/presigned-urls"),
                Some(body),
            )
            .await?;
        Ok(resp.upload_urls.unwrap_or_default())
    }

    /// Report chunks that were durably stored.
    pub async fn report_chunk_batch(
        &self,
        upload_id: &str,
        completed_chunks: &[CompletedChunk],
    ) -> Result<ReportChunkBatchResponse> {
        let body = json!({ "completed_chunks": completed_chunks });
        self.request(
            Method::POST,
            &format!("/assets/multipart-uploads/{upload_id}"),
            Some(body),
        )
        .await
    }

    /// Fetch the status of every chunk, walking all result pages.
    pub async fn get_upload_status(&self, upload_id: &str) -> Result<Vec<ChunkStatus>> {
        let mut chunks = Vec::new();
        let mut page = 1;

        loop {
            let resp: UploadStatusPage = self
                .request(
                    Method::GET,
                    &format!(
                        "/assets/multipart-uploads/{upload_id}?page={page}&page_limit={STATUS_PAGE_LIMIT}"
                    ),
                    None,
                )
                .await?;
            chunks.extend(resp.data);

            match resp.page_info {
                Some(info) if page < info.total_page => page += 1,
                _ => return Ok(chunks),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Execute an HTTP request with automatic retry for transient failures.
    ///
    /// Retries are performed for:
    /// - HTTP 5xx server errors
    /// - HTTP 429 rate-limit responses
    /// - Network-level errors (connection refused, timeout, etc.)
    ///
    /// Exponential backoff is applied: 1s, 2s, 4s, ...
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&self.api_key).map_err(|_| TwelveLabsError::Authentication {
                message: "API key contains invalid header characters".into(),
            })?,
        );

        let mut last_err: Option<TwelveLabsError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(backoff).await;
            }

            let mut req = self
                .http
                .request(method.clone(), &url)
                .headers(headers.clone());

            if let Some(ref b) = body {
                req = req.header(CONTENT_TYPE, "application/json").json(b);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    // Network-level error: retry if we have attempts left.
                    last_err = Some(TwelveLabsError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let value: T = response.json().await.map_err(TwelveLabsError::Http)?;
                return Ok(value);
            }

            let status_code = status.as_u16();
            let response_text = response.text().await.unwrap_or_default();

            let parsed_body: Option<serde_json::Value> =
                serde_json::from_str(&response_text).ok();

            let message = parsed_body
                .as_ref()
                .and_then(|b| b.get("message").or_else(|| b.get("error")))
                .and_then(|e| e.as_str())
                .unwrap_or(&response_text)
                .to_string();

            let err = match status_code {
                401 => TwelveLabsError::Authentication { message },
                403 => TwelveLabsError::PermissionDenied { message },
                404 => TwelveLabsError::NotFound { message },
                429 => {
                    let retry_after = parsed_body
                        .as_ref()
                        .and_then(|b| b.get("retry_after"))
                        .and_then(|v| v.as_f64());

                    TwelveLabsError::RateLimit {
                        message,
                        retry_after,
                    }
                }
                _ => TwelveLabsError::Api {
                    status_code,
                    message,
                    body: parsed_body,
                },
            };

            // Retry on 5xx or 429; return immediately for other errors.
            if status_code >= 500 || status_code == 429 {
                last_err = Some(err);
                continue;
            }

            return Err(err);
        }

        // All retries exhausted.
        Err(last_err.unwrap_or_else(|| TwelveLabsError::Api {
            status_code: 0,
            message: "request failed after all retries".into(),
            body: None,
        }))
    }
}

#[async_trait]
impl UploadApi for Client {
    async fn create_upload_session(
        &self,
        request: &CreateUploadSessionRequest,
    ) -> Result<CreateUploadSessionResponse> {
        Client::create_upload_session(self, request).await
    }

    async fn get_additional_presigned_urls(
        &self,
        upload_id: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<PresignedUrl>> {
        Client::get_additional_presigned_urls(self, upload_id, start, count).await
    }

    async fn report_chunk_batch(
        &self,
        upload_id: &str,
        completed_chunks: &[CompletedChunk],
    ) -> Result<ReportChunkBatchResponse> {
        Client::report_chunk_batch(self, upload_id, completed_chunks).await
    }

    async fn get_upload_status(&self, upload_id: &str) -> Result<Vec<ChunkStatus>> {
        Client::get_upload_status(self, upload_id).await
    }
}

#[async_trait]
impl ChunkTransport for Client {
    /// `PUT` the chunk to its presigned URL. Presigned URLs carry their own
    /// authorization, so no API key is sent.
    async fn put_chunk(&self, chunk: &Chunk, url: &str) -> Result<String> {
        let bytes = chunk.read().await.map_err(|e| {
            TwelveLabsError::chunk_upload(
                chunk.index,
                format!("cannot read {}", chunk.path.display()),
                Some(TwelveLabsError::Io(e)),
            )
        })?;

        let resp = self
            .http
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.chunk_timeout)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                TwelveLabsError::chunk_upload(
                    chunk.index,
                    "HTTP error during chunk upload",
                    Some(TwelveLabsError::Http(e)),
                )
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TwelveLabsError::chunk_upload(
                chunk.index,
                format!("storage returned HTTP {}", status.as_u16()),
                Some(TwelveLabsError::Api {
                    status_code: status.as_u16(),
                    message: text,
                    body: None,
                }),
            ));
        }

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        etag.ok_or_else(|| TwelveLabsError::chunk_upload(chunk.index, "no ETag received", None))
    }
}
