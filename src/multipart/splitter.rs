use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::errors::{Result, TwelveLabsError};

/// One contiguous byte range of the source file, materialized on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position among all chunks of the file.
    pub index: u32,
    pub path: PathBuf,
    /// Only the last chunk may be shorter than the session chunk size.
    pub size: u64,
}

impl Chunk {
    /// Load the chunk's bytes from disk.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }
}

/// The chunks of one file plus the scratch directory that holds them.
///
/// The directory is owned exclusively by this value. Call
/// [`cleanup`](Self::cleanup) when done; dropping without it removes the
/// directory synchronously.
#[derive(Debug)]
pub struct ChunkSet {
    dir: PathBuf,
    chunks: Vec<Chunk>,
    cleaned: bool,
}

impl ChunkSet {
    /// Chunks in index order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks. Never zero for a set returned by [`split_file`].
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Scratch directory holding the chunk files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every chunk and the scratch directory. Failures are logged.
    pub async fn cleanup(mut self) {
        self.cleaned = true;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "removed chunk directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to clean up chunk files"
            ),
        }
    }
}

impl Drop for ChunkSet {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "failed to clean up chunk files");
            }
        }
    }
}

/// Split `path` into chunks of `chunk_size` bytes inside a fresh sibling
/// directory.
///
/// On any failure the partial chunks are removed before the error is
/// returned. An empty file is an error, never an empty set.
pub async fn split_file(path: &Path, chunk_size: u64) -> Result<ChunkSet> {
    if chunk_size == 0 {
        return Err(TwelveLabsError::InvalidArgument(
            "chunk size must be greater than 0".into(),
        ));
    }
    let buf_len = usize::try_from(chunk_size).map_err(|_| {
        TwelveLabsError::InvalidArgument(format!("chunk size {chunk_size} exceeds address space"))
    })?;

    let dir = chunk_dir_for(path);
    fs::create_dir(&dir).await.map_err(|e| {
        TwelveLabsError::split(format!("cannot create {}", dir.display()), Some(e))
    })?;

    let mut set = ChunkSet {
        dir,
        chunks: Vec::new(),
        cleaned: false,
    };

    match write_chunks(path, buf_len, &mut set).await {
        Ok(()) if set.is_empty() => {
            set.cleanup().await;
            Err(TwelveLabsError::split("no chunks created from file", None))
        }
        Ok(()) => Ok(set),
        Err(e) => {
            set.cleanup().await;
            Err(e)
        }
    }
}

fn chunk_dir_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let name = format!(".{stem}_chunks_{}", uuid::Uuid::new_v4().simple());
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

async fn write_chunks(path: &Path, buf_len: usize, set: &mut ChunkSet) -> Result<()> {
    let mut file = File::open(path).await.map_err(|e| {
        TwelveLabsError::split(format!("cannot open {}", path.display()), Some(e))
    })?;
    let file_len = file
        .metadata()
        .await
        .map_err(|e| TwelveLabsError::split(format!("cannot stat {}", path.display()), Some(e)))?
        .len();
    let buf_cap = usize::try_from(file_len).map_or(buf_len, |len| len.min(buf_len));
    let mut buf = vec![0u8; buf_cap];

    loop {
        let n = read_full(&mut file, &mut buf).await.map_err(|e| {
            TwelveLabsError::split(format!("cannot read {}", path.display()), Some(e))
        })?;
        if n == 0 {
            break;
        }

        let index = u32::try_from(set.chunks.len() + 1)
            .map_err(|_| TwelveLabsError::split("too many chunks", None))?;
        let chunk_path = set.dir.join(format!("chunk_{index:04}"));
        fs::write(&chunk_path, &buf[..n]).await.map_err(|e| {
            TwelveLabsError::split(format!("cannot write {}", chunk_path.display()), Some(e))
        })?;

        set.chunks.push(Chunk {
            index,
            path: chunk_path,
            size: n as u64,
        });

        if n < buf_len {
            break;
        }
    }

    Ok(())
}

/// Fill `buf` unless EOF comes first. Returns the number of bytes read.
async fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn split_covers_file_without_gaps() {
        let tmp = tempfile::tempdir().unwrap();

        for (size, chunk_size) in [(1usize, 4u64), (12, 4), (13, 4), (100, 7), (5, 100)] {
            let path = tmp.path().join(format!("f_{size}_{chunk_size}.bin"));
            let data = sample(size);
            std::fs::write(&path, &data).unwrap();

            let set = split_file(&path, chunk_size).await.unwrap();
            let expected = (size as u64).div_ceil(chunk_size) as usize;
            assert_eq!(set.len(), expected, "size={size} chunk={chunk_size}");
            assert_eq!(set.total_size(), size as u64);

            let mut joined = Vec::new();
            for (i, chunk) in set.chunks().iter().enumerate() {
                assert_eq!(chunk.index, i as u32 + 1);
                if i + 1 < set.len() {
                    assert_eq!(chunk.size, chunk_size);
                } else {
                    assert!(chunk.size > 0 && chunk.size <= chunk_size);
                }
                joined.extend(chunk.read().await.unwrap());
            }
            assert_eq!(joined, data);

            let dir = set.dir().to_path_buf();
            set.cleanup().await;
            assert!(!dir.exists());
        }
    }

    #[tokio::test]
    async fn empty_file_is_rejected_and_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();

        let err = split_file(&path, 1024).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Split);
        assert_eq!(
            err.to_string(),
            "failed to split file into chunks: no chunks created from file"
        );

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "only the source file should remain");
    }

    #[tokio::test]
    async fn unreadable_source_cleans_up_scratch_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.mp4");

        let err = split_file(&path, 16).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Split);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();

        let err = split_file(&path, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[cfg(target_pointer_width = "64")]
    #[tokio::test]
    async fn small_file_with_huge_chunk_size_is_one_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("small.bin");
        std::fs::write(&path, sample(10)).unwrap();

        // 1 TiB: allocating a full chunk buffer here would abort the test.
        let set = split_file(&path, 1 << 40).await.unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.chunks()[0].size, 10);
        assert_eq!(set.chunks()[0].read().await.unwrap(), sample(10));
        set.cleanup().await;
    }

    #[tokio::test]
    async fn dropping_without_cleanup_removes_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        std::fs::write(&path, sample(10)).unwrap();

        let set = split_file(&path, 3).await.unwrap();
        let dir = set.dir().to_path_buf();
        assert!(dir.exists());
        drop(set);
        assert!(!dir.exists());
    }
}
