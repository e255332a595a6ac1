//! Synchronous wrapper around the async [`Client`](crate::Client).
//!
//! Each blocking client owns a current-thread tokio runtime. Do not use it
//! from inside an async context; call the async client there instead.
//!
//! ```no_run
//! use twelvelabs::blocking::Client;
//!
//! # fn example() -> twelvelabs::Result<()> {
//! let client = Client::new("tlk_your_api_key")?;
//! let result = client.upload_file("clip.mp4", None)?;
//! println!("asset {}", result.asset_id);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use tokio::runtime::{Builder, Runtime};

use crate::errors::Result;
use crate::models::{ChunkStatus, UploadOptions, UploadResult, UploadStatus, WaitOptions};
use crate::ClientBuilder;

/// Blocking Twelve Labs client. Same operations as [`crate::Client`], each
/// driven to completion on an owned runtime.
pub struct Client {
    inner: crate::Client,
    rt: Runtime,
}

impl Client {
    /// Create a blocking client with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_builder(ClientBuilder::new().api_key(api_key))
    }

    /// Build a blocking client from a configured [`ClientBuilder`].
    pub fn from_builder(builder: ClientBuilder) -> Result<Self> {
        let rt = Builder::new_current_thread().enable_all().build()?;
        // reqwest's connector must be created inside a runtime context.
        let inner = {
            let _guard = rt.enter();
            builder.build()?
        };
        Ok(Self { inner, rt })
    }

    /// Blocking form of [`crate::Client::upload_file`].
    pub fn upload_file(
        &self,
        path: impl AsRef<Path>,
        opts: Option<UploadOptions>,
    ) -> Result<UploadResult> {
        self.rt.block_on(self.inner.upload_file(path, opts))
    }

    /// Blocking form of [`crate::Client::upload_files`].
    pub fn upload_files<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
        opts: &UploadOptions,
    ) -> Vec<Result<UploadResult>> {
        self.rt.block_on(self.inner.upload_files(paths, opts))
    }

    /// Blocking form of [`crate::Client::wait_for_upload_completion`].
    pub fn wait_for_upload_completion(
        &self,
        upload_id: &str,
        opts: Option<WaitOptions>,
    ) -> Result<UploadStatus> {
        self.rt
            .block_on(self.inner.wait_for_upload_completion(upload_id, opts))
    }

    /// Blocking form of [`crate::Client::get_upload_status`].
    pub fn get_upload_status(&self, upload_id: &str) -> Result<Vec<ChunkStatus>> {
        self.rt.block_on(self.inner.get_upload_status(upload_id))
    }
}
