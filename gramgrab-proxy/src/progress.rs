//! Byte-level progress over any chunked body stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;

/// Snapshot of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    /// Only known when the upstream announced a length.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    #[must_use]
    pub const fn new(total_bytes: Option<u64>) -> Self {
        Self {
            bytes_transferred: 0,
            total_bytes,
        }
    }

    /// Rounded completion percentage, capped at 100.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        let total = self.total_bytes.filter(|t| *t > 0)?;
        let pct = (self.bytes_transferred as f64 / total as f64 * 100.0).round();
        Some(pct.min(100.0) as u8)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_bytes
            .is_some_and(|total| self.bytes_transferred >= total)
    }
}

/// Stream adapter that reports a [`DownloadProgress`] after every chunk.
///
/// Chunks and errors pass through untouched.
pub struct ProgressStream<S, F> {
    inner: S,
    progress: DownloadProgress,
    on_progress: F,
}

impl<S, F> ProgressStream<S, F> {
    pub fn new(inner: S, total_bytes: Option<u64>, on_progress: F) -> Self {
        Self {
            inner,
            progress: DownloadProgress::new(total_bytes),
            on_progress,
        }
    }

    #[must_use]
    pub const fn progress(&self) -> DownloadProgress {
        self.progress
    }
}

impl<S, F, E> Stream for ProgressStream<S, F>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    F: FnMut(DownloadProgress) + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.progress.bytes_transferred += chunk.len() as u64;
                (this.on_progress)(this.progress);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
