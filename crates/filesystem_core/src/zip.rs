//! ZIP materialization, grounded on `fsManager.go`'s `GetBucketFilesAsZip`:
//! a ZIP writer whose output is teed to a SHA-256 hasher and a temp file, so
//! the archive's content-addressed key is known exactly as the last byte is
//! written.

use std::{
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};

use async_zip::{tokio::write::ZipFileWriter, Compression, ZipEntryBuilder};
use pin_project::pin_project;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An `AsyncWrite` that forwards every write to `inner` while folding the
/// same bytes into a running SHA-256, mirroring `io.MultiWriter(tmpFile, hash)`.
#[pin_project]
struct TeeHasher<W> {
    #[pin]
    inner: W,
    hasher: Sha256,
}

impl<W: AsyncWrite> TeeHasher<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }
}

impl<W: AsyncWrite> AsyncWrite for TeeHasher<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.project();
        match this.inner.poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.hasher.update(&buf[..n]);
                Poll::Ready(Ok(n))
            },
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// Result of materializing a ZIP: its content, hex-encoded SHA-256 (used as
/// the content-addressed object key), and the temp file path it was
/// written through (kept only for the duration of the caller's upload).
pub struct MaterializedZip {
    pub content: Vec<u8>,
    pub sha256_hex: String,
}

/// Builds a ZIP archive from `entries` (path, content pairs), writing
/// through a temp file so large archives don't require holding two full
/// copies in memory at once. Per-entry write failures are skipped —
/// callers have already excluded files that failed to `GetFile`.
pub async fn build_zip(entries: Vec<(String, Vec<u8>)>) -> anyhow::Result<MaterializedZip> {
    let temp_file = tempfile::NamedTempFile::new()?;
    let path: PathBuf = temp_file.path().to_owned();
    let file = tokio::fs::File::create(&path).await?;
    let mut tee = TeeHasher::new(file);

    {
        let mut writer = ZipFileWriter::with_tokio(&mut tee);
        for (path, content) in entries {
            let entry = ZipEntryBuilder::new(path.into(), Compression::Deflate).build();
            // A single bad entry shouldn't sink the whole archive; matches
            // the original's "continue" on a per-file zip-write error.
            if let Err(err) = writer.write_entry_whole(entry, &content).await {
                tracing::warn!(%err, "failed to write zip entry");
            }
        }
        writer.close().await?;
    }
    tee.flush().await?;
    tee.shutdown().await?;

    let sha256_hex = hex::encode(tee.hasher.clone().finalize());
    let content = tokio::fs::read(&path).await?;

    Ok(MaterializedZip {
        content,
        sha256_hex,
    })
}
