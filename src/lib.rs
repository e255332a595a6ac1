//! # Twelve Labs SDK for Rust
//!
//! Client for the [Twelve Labs](https://twelvelabs.io) video understanding
//! API, focused on getting large assets onto the platform: chunked multipart
//! uploads with bounded parallelism, per-chunk retry, progress callbacks and
//! completion polling.
//!
//! ## Quick start
//!
//! ```no_run
//! use twelvelabs::Client;
//!
//! #[tokio::main]
//! async fn main() -> twelvelabs::Result<()> {
//!     let client = Client::new("tlk_your_api_key");
//!
//!     let result = client.upload_file("meeting.mp4", None).await?;
//!     println!("asset {} {}", result.asset_id, result.asset_url);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Upload options
//!
//! ```no_run
//! use std::time::Duration;
//! use twelvelabs::{AssetType, ClientBuilder, UploadOptions, UploadProgress};
//!
//! # async fn example() -> twelvelabs::Result<()> {
//! let client = ClientBuilder::new()
//!     .api_key("tlk_your_api_key")
//!     .chunk_timeout(Duration::from_secs(600))
//!     .build()?;
//!
//! let opts = UploadOptions {
//!     filename: Some("keynote.mp4".into()),
//!     file_type: AssetType::Video,
//!     batch_size: 5,
//!     max_workers: 3,
//!     on_progress: Some(Box::new(|p: &UploadProgress| {
//!         println!("{:.1}% ({}/{})", p.percentage, p.completed_chunks, p.total_chunks);
//!     })),
//!     ..Default::default()
//! };
//! let result = client.upload_file("keynote.mp4", Some(opts)).await?;
//! println!("asset {}", result.asset_id);
//! # Ok(())
//! # }
//! ```
//!
//! For synchronous code, see [`blocking::Client`].

pub mod blocking;
mod client;
mod errors;
mod models;
pub mod multipart;

pub use client::{Client, ClientBuilder};
pub use errors::{ErrorKind, Result, TwelveLabsError};
pub use models::{
    AssetType, ChunkStatus, CompletedChunk, CreateUploadSessionRequest,
    CreateUploadSessionResponse, PresignedUrl, ReportChunkBatchResponse, UploadOptions,
    UploadProgress, UploadResult, UploadSession, UploadStatus, WaitOptions,
};
pub use multipart::{ChunkTransport, UploadApi};
