//! UploadSessionStream - write-only adapter over the chunked upload session protocol
//!
//! Every non-empty write becomes exactly one protocol call: the first one
//! starts the session, later ones append at the running offset. Closing
//! commits the session to the destination path. Nothing is buffered here;
//! wrap the stream in a [`BufferedUpload`](crate::BufferedUpload) to batch
//! small writes.
//!
//! A stream has a single writer. Methods take `&mut self`, so sharing one
//! instance between tasks requires the caller's own synchronization, and the
//! resulting call order is the order the protocol sees.

use crate::{
    client::{SessionClient, SessionId, UploadCursor, UploadTarget},
    runtime, BindError, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// An async, write-only sink that ends in a committed upload
#[async_trait]
pub trait UploadSink: Send {
    /// Send one owned chunk
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Write `buf`; an empty slice is a no-op
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.write_chunk(Bytes::copy_from_slice(buf)).await
    }

    /// Push anything held locally to the remote service
    async fn flush(&mut self) -> Result<()>;

    /// Commit the upload and return the total bytes committed
    ///
    /// Idempotent: later calls return the same total without contacting the
    /// service.
    async fn close(&mut self) -> Result<u64>;

    /// Bytes acknowledged by the remote service
    fn position(&self) -> u64;

    /// Whether the sink still accepts writes
    fn is_open(&self) -> bool;

    /// Close without committing
    fn abandon(&mut self);

    /// Close the sink and hand back an owned future that sends `tail` and commits
    ///
    /// Returns `None` if the sink is already closed. Used where the sink
    /// cannot be awaited, such as `Drop`.
    fn detach(&mut self, tail: Bytes) -> Option<BoxFuture<'static, Result<u64>>>;
}

pub(crate) fn write_only() -> BindError {
    BindError::UnsupportedOperation("upload streams are write-only".to_string())
}

/// Session id and acknowledged offset
#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<SessionId>,
    offset: u64,
}

impl SessionState {
    /// Start or append. State only moves once the call has succeeded, so a
    /// failed or cancelled call leaves nothing half-counted.
    async fn send(&mut self, client: &dyn SessionClient, chunk: Bytes) -> Result<()> {
        let len = chunk.len() as u64;
        match &self.session_id {
            None => {
                let id = client.session_start(chunk).await?;
                debug!(session = %id, bytes = len, "Started upload session");
                self.session_id = Some(id);
            }
            Some(id) => {
                let cursor = UploadCursor {
                    session_id: id.clone(),
                    offset: self.offset,
                };
                client.session_append(&cursor, chunk).await?;
                trace!(session = %id, offset = self.offset, bytes = len, "Appended chunk");
            }
        }
        self.offset += len;
        Ok(())
    }

    async fn commit(&mut self, client: &dyn SessionClient, target: &UploadTarget) -> Result<u64> {
        let session_id = match &self.session_id {
            Some(id) => id.clone(),
            None => {
                // Nothing was written: an empty session still creates the file.
                let id = client.session_start(Bytes::new()).await?;
                self.session_id = Some(id.clone());
                id
            }
        };

        let cursor = UploadCursor {
            session_id,
            offset: self.offset,
        };
        debug!(
            session = %cursor.session_id,
            bytes = cursor.offset,
            path = %target.destination(),
            "Finishing upload session"
        );
        client.session_finish(&cursor, target).await?;
        Ok(self.offset)
    }
}

/// Write-only stream committing to one remote file through an upload session
#[derive(Debug)]
pub struct UploadSessionStream {
    client: Arc<dyn SessionClient>,
    target: UploadTarget,
    state: SessionState,
    open: bool,
}

impl UploadSessionStream {
    /// Create a stream that will commit to `target`
    ///
    /// No remote call is made until the first non-empty write or the close.
    pub fn new(client: Arc<dyn SessionClient>, target: UploadTarget) -> Self {
        Self {
            client,
            target,
            state: SessionState::default(),
            open: true,
        }
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Session id, present once the first chunk has been sent
    pub fn session_id(&self) -> Option<&SessionId> {
        self.state.session_id.as_ref()
    }

    /// Bytes acknowledged by the remote service so far
    pub fn position(&self) -> u64 {
        self.state.offset
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Send `buf` as one chunk
    ///
    /// An empty slice does nothing. On failure the offset is unchanged and the
    /// same write may be retried.
    pub async fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            trace!(path = %self.target.destination(), "Ignoring empty write");
            return self.ensure_open();
        }
        self.write_bytes(Bytes::copy_from_slice(buf)).await
    }

    /// Send an owned chunk without copying
    pub async fn write_bytes(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_open()?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.state.send(self.client.as_ref(), chunk).await
    }

    /// Commit the session to the destination
    ///
    /// Runs the finish call at most once. The stream is closed before the call
    /// is made, so a failed finish is reported but never retried.
    pub async fn close(&mut self) -> Result<u64> {
        if !self.open {
            return Ok(self.state.offset);
        }
        self.open = false;
        self.state.commit(self.client.as_ref(), &self.target).await
    }

    /// Close without committing; the remote session is left to expire
    pub fn abandon(&mut self) {
        if self.open {
            warn!(
                path = %self.target.destination(),
                bytes = self.state.offset,
                "Abandoning upload session without commit"
            );
            self.open = false;
        }
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

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BindError::Closed(self.target.destination().to_string()))
        }
    }
}

#[async_trait]
impl UploadSink for UploadSessionStream {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.write_bytes(chunk).await
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<u64> {
        UploadSessionStream::close(self).await
    }

    fn position(&self) -> u64 {
        self.state.offset
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn abandon(&mut self) {
        UploadSessionStream::abandon(self)
    }

    fn detach(&mut self, tail: Bytes) -> Option<BoxFuture<'static, Result<u64>>> {
        if !self.open {
            return None;
        }
        self.open = false;

        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        let mut state = self.state.clone();
        Some(Box::pin(async move {
            if !tail.is_empty() {
                state.send(client.as_ref(), tail).await?;
            }
            state.commit(client.as_ref(), &target).await
        }))
    }
}

impl Drop for UploadSessionStream {
    fn drop(&mut self) {
        let path = self.target.destination().to_string();
        if let Some(finish) = UploadSink::detach(self, Bytes::new()) {
            warn!(path = %path, "Upload stream dropped while open, finishing in background");
            runtime::finish_detached(path, finish);
        }
    }
}
