use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors that can occur when using the Twelve Labs SDK.
#[derive(Error, Debug)]
pub enum TwelveLabsError {
    /// The API key is missing or invalid (HTTP 401).
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The authenticated user does not have access to the requested resource (HTTP 403).
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The requested resource was not found (HTTP 404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The request was rate-limited (HTTP 429).
    #[error("rate limited (retry after {retry_after:?}s): {message}")]
    RateLimit {
        message: String,
        retry_after: Option<f64>,
    },

    /// A non-specific API error with the HTTP status code and response body.
    #[error("API error {status_code}: {message}")]
    Api {
        status_code: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// A transport-level HTTP error from reqwest.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error outside of chunk splitting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied option was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source file does not exist. Raised before any network activity.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The upload session response was malformed or incomplete.
    #[error("invalid upload session response: {0}")]
    SessionCreation(String),

    /// Splitting the source file into chunks failed. Partial chunks are
    /// removed before this is returned.
    #[error("failed to split file into chunks: {message}")]
    Split {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A single attempt to transfer one chunk failed.
    #[error("chunk {chunk_index} upload failed: {message}")]
    ChunkUpload {
        chunk_index: u32,
        message: String,
        #[source]
        source: Option<Box<TwelveLabsError>>,
    },

    /// The server did not hand out a presigned URL for a chunk that needs one.
    #[error("no presigned URL available for chunk {chunk_index}")]
    MissingPresignedUrl { chunk_index: u32 },

    /// A chunk exhausted its retries, aborting the batch and the upload.
    #[error("chunk {chunk_index} upload failed after {attempts} attempts")]
    BatchAborted {
        chunk_index: u32,
        attempts: u32,
        #[source]
        source: Box<TwelveLabsError>,
    },

    /// Waiting for completion exceeded the configured deadline.
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    /// The server reported chunks in a terminal failed state.
    #[error("chunks {chunk_indices:?} failed to upload")]
    RemoteChunkFailure { chunk_indices: Vec<u32> },
}

/// Coarse discriminator over [`TwelveLabsError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 401 or no API key configured.
    Authentication,
    /// HTTP 403.
    PermissionDenied,
    /// HTTP 404.
    NotFound,
    /// HTTP 429.
    RateLimit,
    /// Any other non-success API response.
    Api,
    /// Connection, timeout or decoding failure in reqwest.
    Http,
    Io,
    /// Rejected option value.
    InvalidArgument,
    /// Source file missing; nothing was sent.
    FileNotFound,
    /// Session response lacked an upload id or chunk size.
    SessionCreation,
    Split,
    /// One chunk transfer attempt failed.
    ChunkUpload,
    /// No presigned URL for a chunk after fetching.
    MissingPresignedUrl,
    /// A chunk ran out of retries.
    BatchAborted,
    /// Polling deadline passed.
    Timeout,
    /// The server marked chunks as failed.
    RemoteChunkFailure,
}

impl TwelveLabsError {
    /// Which variant this is, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Api { .. } => ErrorKind::Api,
            Self::Http(_) => ErrorKind::Http,
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::SessionCreation(_) => ErrorKind::SessionCreation,
            Self::Split { .. } => ErrorKind::Split,
            Self::ChunkUpload { .. } => ErrorKind::ChunkUpload,
            Self::MissingPresignedUrl { .. } => ErrorKind::MissingPresignedUrl,
            Self::BatchAborted { .. } => ErrorKind::BatchAborted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RemoteChunkFailure { .. } => ErrorKind::RemoteChunkFailure,
        }
    }

    /// The 1-based chunk index this error is about, if any.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            Self::ChunkUpload { chunk_index, .. }
            | Self::MissingPresignedUrl { chunk_index }
            | Self::BatchAborted { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }

    pub(crate) fn split(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::Split {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn chunk_upload(
        chunk_index: u32,
        message: impl Into<String>,
        source: Option<TwelveLabsError>,
    ) -> Self {
        Self::ChunkUpload {
            chunk_index,
            message: message.into(),
            source: source.map(Box::new),
        }
    }
}

/// A convenience alias for `Result<T, TwelveLabsError>`.
pub type Result<T> = std::result::Result<T, TwelveLabsError>;
