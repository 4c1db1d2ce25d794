//! Fixed-size chunked reads for streaming transfers
//!
//! Chunk size is picked from the total transfer size:
//!   - >= 1GB:   10MB
//!   - >= 100MB: 4MB
//!   - unknown:  100KB (zipped folder downloads)
//!   - else:     1MB
//!
//! `ChunkStream` is the single place transfer progress is computed: every
//! emitted chunk reports the cumulative byte count. The last report is the
//! number of bytes actually read, so a source that shrank after its size was
//! taken never shows as complete.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncRead;
use tokio_util::io::poll_read_buf;

const KB: usize = 1024;
const MB: usize = 1024 * KB;

/// Cumulative-bytes progress hook invoked as chunks are handed out
pub type ChunkProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Pick the chunk size for a transfer of `total` bytes (`None` = unknown).
pub fn choose_chunk_size(total: Option<u64>) -> usize {
    match total {
        None => 100 * KB,
        Some(t) if t >= 1 << 30 => 10 * MB,
        Some(t) if t >= 100 << 20 => 4 * MB,
        Some(_) => MB,
    }
}

/// Wrap `reader` in a lazy stream of `chunk_size` byte buffers.
///
/// The last chunk may be short. The stream ends on the first empty read and
/// cannot be restarted.
pub fn chunks<R: AsyncRead + Unpin>(reader: R, chunk_size: usize) -> ChunkStream<R> {
    ChunkStream {
        reader,
        chunk_size: chunk_size.max(1),
        buf: BytesMut::new(),
        emitted: 0,
        last_reported: None,
        on_progress: None,
        eof: false,
        finished: false,
    }
}

pub struct ChunkStream<R> {
    reader: R,
    chunk_size: usize,
    buf: BytesMut,
    emitted: u64,
    last_reported: Option<u64>,
    on_progress: Option<ChunkProgress>,
    eof: bool,
    finished: bool,
}

impl<R> ChunkStream<R> {
    /// Report cumulative bytes through `on_progress`. An empty source
    /// reports 0 once at the end.
    pub fn with_progress(mut self, on_progress: ChunkProgress) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Bytes handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn report(&mut self, value: u64) {
        if let Some(cb) = &self.on_progress {
            cb(value);
        }
        self.last_reported = Some(value);
    }

    fn emit(&mut self) -> Bytes {
        let chunk = if self.buf.len() > self.chunk_size {
            self.buf.split_to(self.chunk_size)
        } else {
            self.buf.split()
        };
        self.emitted += chunk.len() as u64;
        self.report(self.emitted);
        chunk.freeze()
    }

    fn finish(&mut self) {
        self.finished = true;
        if self.last_reported.is_none() {
            self.report(self.emitted);
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for ChunkStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        while !this.eof && this.buf.len() < this.chunk_size {
            if this.buf.capacity() == this.buf.len() {
                this.buf.reserve(this.chunk_size - this.buf.len());
            }
            match ready!(poll_read_buf(Pin::new(&mut this.reader), cx, &mut this.buf)) {
                Ok(0) => this.eof = true,
                Ok(_) => {}
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }

        if !this.buf.is_empty() {
            return Poll::Ready(Some(Ok(this.emit())));
        }

        this.finish();
        Poll::Ready(None)
    }
}
