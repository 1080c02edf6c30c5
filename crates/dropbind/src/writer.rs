//! BlockingUpload - synchronous `Write` over an async upload sink

use crate::{
    buffer::BufferedUpload,
    runtime::{self, shared_runtime},
    upload::{write_only, UploadSessionStream, UploadSink},
    Result,
};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// A writer that provides synchronous write access to an upload
///
/// Each `write` blocks until the underlying protocol call has completed. The
/// upload is committed by [`finish`](Self::finish), or on drop if it was
/// never finished. Use `finish` when the commit error matters: drop can only
/// log it.
///
/// Must not be used from inside an async context; calls made there fail with
/// a runtime error instead of blocking the executor.
#[derive(Debug)]
pub struct BlockingUpload<S: UploadSink = BufferedUpload<UploadSessionStream>> {
    sink: S,
    runtime: Arc<Runtime>,
}

impl<S: UploadSink> BlockingUpload<S> {
    /// Wrap `sink`, driving it on the shared runtime
    pub fn new(sink: S) -> Result<Self> {
        Ok(Self::with_runtime(sink, shared_runtime()?))
    }

    pub fn with_runtime(sink: S, runtime: Arc<Runtime>) -> Self {
        Self { sink, runtime }
    }

    /// Bytes acknowledged by the remote service
    pub fn position(&self) -> u64 {
        self.sink.position()
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Always fails: the length of an upload is unknown until it is committed
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> Result<u64> {
        Err(write_only())
    }

    /// Always fails: uploads are append-only
    pub fn set_position(&mut self, _position: u64) -> Result<()> {
        Err(write_only())
    }

    /// Commit the upload and return the total bytes committed
    pub fn finish(mut self) -> Result<u64> {
        runtime::block_on_with(&self.runtime, self.sink.close())?
    }
}

impl<S: UploadSink> Write for BlockingUpload<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        runtime::block_on_with(&self.runtime, self.sink.write(buf))??;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        runtime::block_on_with(&self.runtime, self.sink.flush())??;
        Ok(())
    }
}

impl<S: UploadSink> Read for BlockingUpload<S> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(write_only().into())
    }
}

impl<S: UploadSink> Seek for BlockingUpload<S> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(write_only().into())
    }
}

impl<S: UploadSink> Drop for BlockingUpload<S> {
    fn drop(&mut self) {
        if !self.sink.is_open() {
            return;
        }

        // Inside an async context the sink's own drop finishes in the background.
        if let Ok(closed) = runtime::block_on_with(&self.runtime, self.sink.close()) {
            match closed {
                Ok(bytes) => debug!(bytes, "Finished upload on drop"),
                Err(e) => warn!(error = %e, "Failed to finish upload on drop"),
            }
        }
    }
}
