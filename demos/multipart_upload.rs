//! Multipart upload walkthrough.
//!
//! Run with:
//!   TWELVE_LABS_API_KEY=tlk_... cargo run --example multipart_upload -- video.mp4 [more.mp4 ...]
//!
//! Set `RUST_LOG=twelvelabs=debug` to see per-batch and per-chunk events.

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use twelvelabs::{
    AssetType, ClientBuilder, ErrorKind, UploadOptions, UploadProgress, UploadStatus, WaitOptions,
};

#[tokio::main]
async fn main() -> twelvelabs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("twelvelabs=info")),
        )
        .init();

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        paths.push("video.mp4".to_string());
    }

    // -----------------------------------------------------------------------
    // 1. Create a client (reads TWELVE_LABS_API_KEY from environment)
    // -----------------------------------------------------------------------
    let client = ClientBuilder::new()
        .chunk_timeout(Duration::from_secs(600))
        .build()?;

    // -----------------------------------------------------------------------
    // 2. Upload one file with a progress bar
    // -----------------------------------------------------------------------
    let opts = UploadOptions {
        file_type: AssetType::Video,
        batch_size: 5,
        max_workers: 3,
        max_retries: 3,
        retry_delay: Duration::from_secs(1),
        on_progress: Some(Box::new(|p: &UploadProgress| {
            let filled = (p.percentage / 100.0 * 30.0) as usize;
            println!(
                "[{}{}] {:.1}% ({}/{} chunks) {}",
                "#".repeat(filled),
                "-".repeat(30 - filled),
                p.percentage,
                p.completed_chunks,
                p.total_chunks,
                p.status
            );
        })),
        ..Default::default()
    };

    match client.upload_file(&paths[0], Some(opts)).await {
        Ok(result) => {
            println!("Uploaded! Asset ID: {}", result.asset_id);
            if !result.asset_url.is_empty() {
                println!("Asset URL: {}", result.asset_url);
            }
        }
        Err(e) if e.kind() == ErrorKind::FileNotFound => {
            println!("File not found: {e}");
            return Ok(());
        }
        Err(e) => {
            println!("Upload failed: {e}");
            if let Some(index) = e.chunk_index() {
                println!("  failed at chunk {index}");
            }
            return Err(e);
        }
    }
    println!();

    // -----------------------------------------------------------------------
    // 3. Upload the rest in bulk; failures are returned, not printed
    // -----------------------------------------------------------------------
    if paths.len() > 1 {
        let results = client
            .upload_files(&paths[1..], &UploadOptions::default())
            .await;
        for (path, result) in paths[1..].iter().zip(results) {
            match result {
                Ok(r) => println!("  {path}: asset {}", r.asset_id),
                Err(e) => println!("  {path}: {e}"),
            }
        }
        println!();
    }

    // -----------------------------------------------------------------------
    // 4. Follow a session's server-side chunk state
    // -----------------------------------------------------------------------
    if let Ok(upload_id) = std::env::var("UPLOAD_ID") {
        let opts = WaitOptions {
            sleep_interval: Duration::from_secs(10),
            max_wait_time: Some(Duration::from_secs(3600)),
            on_status: Some(Box::new(|s: &UploadStatus| {
                println!("  {} ({}/{})", s.status, s.completed_chunks, s.total_chunks);
            })),
        };
        let status = client.wait_for_upload_completion(&upload_id, Some(opts)).await?;
        println!("Upload {upload_id}: {}", status.status);
    }

    Ok(())
}
