// Temp-file artifacts written by the temp-file strategy

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio_util::io::ReaderStream;

/// A file on disk owned by exactly one stream. Removed exactly once.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    removed: AtomicBool,
}

impl TempArtifact {
    /// Reserve a unique path under `dir`. Nothing is created yet.
    pub async fn reserve(dir: &Path, extension: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let name = format!("stream-{}.{}", uuid::Uuid::new_v4(), extension);
        Ok(Self {
            path: dir.join(name),
            removed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Later calls, and a file that never appeared, are no-ops.
    pub fn cleanup(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temp artifact removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temp artifact")
            }
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Open the finished file as a byte stream that removes it when done.
    pub async fn into_stream(self) -> io::Result<TempFileStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(TempFileStream {
            file: Some(ReaderStream::new(file)),
            artifact: self,
        })
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Streams a temp artifact and deletes it on end, error or drop.
pub struct TempFileStream {
    // Declared first so the handle closes before the artifact is removed
    file: Option<ReaderStream<tokio::fs::File>>,
    artifact: TempArtifact,
}

impl TempFileStream {
    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

impl Stream for TempFileStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(file) = this.file.as_mut() else {
            return Poll::Ready(None);
        };

        let polled = Pin::new(file).poll_next(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.file = None;
            this.artifact.cleanup();
        }
        polled
    }
}
