//! Size-bounded file reading.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

const READ_CHUNK: usize = 64 * 1024;

/// Read a whole file, failing once the accumulated size reaches `max_bytes`
pub async fn read_bounded(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut data = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut chunk)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        if data.len() as u64 >= max_bytes {
            bail!(
                "{} is too large: reached {} bytes, limit is {}",
                path.display(),
                data.len(),
                max_bytes
            );
        }
    }

    debug!("Read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0x5A; len]).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_small_file() {
        let file = file_with(1000);
        let data = read_bounded(file.path(), 1001).await.unwrap();
        assert_eq!(data.len(), 1000);
        assert!(data.iter().all(|&b| b == 0x5A));
    }

    #[tokio::test]
    async fn test_rejects_at_limit() {
        let file = file_with(1000);
        assert!(read_bounded(file.path(), 1000).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_large_file() {
        let file = file_with(3 * READ_CHUNK + 17);
        let err = read_bounded(file.path(), READ_CHUNK as u64).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_bounded(&dir.path().join("nope.bin"), 10).await.is_err());
    }
}
