//! Buffer management utilities

use crate::{
    runtime,
    upload::{UploadSessionStream, UploadSink},
    BindError, Result,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use std::ops::Range;
use tracing::{trace, warn};

/// A read buffer holding one downloaded chunk
#[derive(Debug)]
pub(crate) struct ReadBuffer {
    /// The actual data
    data: Bytes,
    /// The range in the source this buffer represents
    range: Range<u64>,
}

impl ReadBuffer {
    /// Create a new read buffer for `data` starting at `start`
    pub fn new(data: Bytes, start: u64) -> Self {
        let range = start..start + data.len() as u64;
        Self { data, range }
    }

    /// Check if this buffer contains the given position
    pub fn contains(&self, pos: u64) -> bool {
        self.range.contains(&pos)
    }

    /// Get data starting from the given position
    pub fn get_from(&self, pos: u64) -> Option<&[u8]> {
        if !self.contains(pos) {
            return None;
        }

        let offset = (pos - self.range.start) as usize;
        Some(&self.data[offset..])
    }
}

/// A write buffer that accumulates data before uploading
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    /// The buffer
    buffer: BytesMut,
    /// Maximum capacity
    capacity: usize,
}

impl WriteBuffer {
    /// Create a new write buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Get the current length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append data; the caller checks capacity first
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the buffer contents, leaving it empty
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Put back a chunk taken with [`take`](Self::take) that could not be sent
    pub fn restore(&mut self, data: &[u8]) {
        debug_assert!(self.buffer.is_empty());
        self.buffer.extend_from_slice(data);
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Batches small writes into larger chunks before they reach an [`UploadSink`]
///
/// Writes that fit are copied into the buffer. When a write would overflow
/// it, the buffer is sent as one chunk first; writes at least as large as the
/// buffer go straight through as their own chunk. Either way a failed write
/// leaves none of its bytes behind, so it can be retried as-is.
///
/// A capacity of zero disables batching.
#[derive(Debug)]
pub struct BufferedUpload<S: UploadSink = UploadSessionStream> {
    inner: S,
    buffer: WriteBuffer,
}

impl<S: UploadSink> BufferedUpload<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            buffer: WriteBuffer::new(capacity),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Bytes accepted but not yet sent
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.is_open() {
            Ok(())
        } else {
            Err(BindError::Closed("buffered upload".to_string()))
        }
    }

    async fn send_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let chunk = self.buffer.take();
        trace!(bytes = chunk.len(), "Sending buffered chunk");
        if let Err(e) = self.inner.write_chunk(chunk.clone()).await {
            self.buffer.restore(&chunk);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: UploadSink> UploadSink for BufferedUpload<S> {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_open()?;
        if chunk.len() >= self.buffer.capacity() {
            self.send_buffer().await?;
            return self.inner.write_chunk(chunk).await;
        }
        UploadSink::write(self, &chunk).await
    }

    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(());
        }

        if self.buffer.len() + buf.len() > self.buffer.capacity() {
            self.send_buffer().await?;
        }

        if buf.len() >= self.buffer.capacity() {
            self.inner.write(buf).await
        } else {
            self.buffer.extend(buf);
            Ok(())
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.send_buffer().await?;
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<u64> {
        if !self.inner.is_open() {
            return self.inner.close().await;
        }

        if let Err(e) = self.send_buffer().await {
            // Committing now would silently drop the buffered tail.
            self.buffer.clear();
            self.inner.abandon();
            return Err(e);
        }
        self.inner.close().await
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn abandon(&mut self) {
        self.buffer.clear();
        self.inner.abandon();
    }

    fn detach(&mut self, tail: Bytes) -> Option<BoxFuture<'static, Result<u64>>> {
        let pending = if tail.is_empty() {
            self.buffer.take()
        } else {
            let mut joined = BytesMut::with_capacity(self.buffer.len() + tail.len());
            joined.extend_from_slice(&self.buffer.take());
            joined.extend_from_slice(&tail);
            joined.freeze()
        };
        self.inner.detach(pending)
    }
}

impl<S: UploadSink> Drop for BufferedUpload<S> {
    fn drop(&mut self) {
        if let Some(finish) = self.detach(Bytes::new()) {
            warn!("Buffered upload dropped while open, finishing in background");
            runtime::finish_detached("buffered upload".to_string(), finish);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_buffer_take_and_restore() {
        let mut buffer = WriteBuffer::new(8);
        buffer.extend(b"abc");
        assert_eq!(buffer.len(), 3);

        let taken = buffer.take();
        assert_eq!(&taken[..], b"abc");
        assert!(buffer.is_empty());

        buffer.restore(&taken);
        assert_eq!(buffer.len(), 3);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_buffer_ranges() {
        let buffer = ReadBuffer::new(Bytes::from_static(b"hello"), 10);
        assert!(!buffer.contains(9));
        assert_eq!(buffer.get_from(10), Some(&b"hello"[..]));
        assert_eq!(buffer.get_from(13), Some(&b"lo"[..]));
        assert_eq!(buffer.get_from(15), None);
    }
}
