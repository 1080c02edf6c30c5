//! Download streams and their synchronous `Read` adapter

use crate::{
    buffer::ReadBuffer,
    runtime::{self, shared_runtime},
    BindError, RemotePath, Result,
};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Runtime;

/// Byte stream over a remote file
pub struct DownloadStream {
    path: RemotePath,
    size: Option<u64>,
    chunks: BoxStream<'static, Result<Bytes>>,
}

impl DownloadStream {
    pub fn new(path: RemotePath, size: Option<u64>, chunks: BoxStream<'static, Result<Bytes>>) -> Self {
        Self { path, size, chunks }
    }

    /// A stream yielding `data` as a single chunk
    pub fn from_bytes(path: RemotePath, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = Some(data.len() as u64);
        Self::new(path, size, stream::iter([Ok(data)]).boxed())
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    /// Total size, when the service reported it
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Collect the whole file
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut data = BytesMut::with_capacity(self.size.unwrap_or(0) as usize);
        while let Some(chunk) = self.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data.freeze())
    }

    /// Collect the whole file as UTF-8 text
    pub async fn text(self) -> Result<String> {
        let data = self.bytes().await?;
        String::from_utf8(data.to_vec())
            .map_err(|e| BindError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Synchronous reader driven by the shared runtime
    pub fn into_blocking(self) -> Result<BlockingDownload> {
        Ok(BlockingDownload::with_runtime(self, shared_runtime()?))
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_next_unpin(cx)
    }
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A reader that provides synchronous access to a [`DownloadStream`]
///
/// Chunks are pulled one at a time as the caller reads.
#[derive(Debug)]
pub struct BlockingDownload {
    stream: DownloadStream,
    runtime: Arc<Runtime>,
    /// Current position in the file
    position: u64,
    /// The chunk being read from
    buffer: Option<ReadBuffer>,
}

impl BlockingDownload {
    pub fn with_runtime(stream: DownloadStream, runtime: Arc<Runtime>) -> Self {
        Self {
            stream,
            runtime,
            position: 0,
            buffer: None,
        }
    }

    /// Bytes read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &RemotePath {
        self.stream.path()
    }

    /// Pull the next chunk; `false` at end of stream
    fn fetch_chunk(&mut self) -> Result<bool> {
        match runtime::block_on_with(&self.runtime, self.stream.next())? {
            Some(chunk) => {
                self.buffer = Some(ReadBuffer::new(chunk?, self.position));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Read for BlockingDownload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(available) = self.buffer.as_ref().and_then(|b| b.get_from(self.position)) {
                let to_read = buf.len().min(available.len());
                buf[..to_read].copy_from_slice(&available[..to_read]);
                self.position += to_read as u64;
                return Ok(to_read);
            }

            if !self.fetch_chunk()? {
                return Ok(0); // EOF
            }
        }
    }
}
