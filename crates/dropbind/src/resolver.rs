//! AccessResolver - turns an access decision into a download or an upload

use crate::{
    access::{AccessDecision, Direction},
    buffer::BufferedUpload,
    client::{SessionClient, UploadTarget},
    config::UploadConfig,
    is_not_found,
    reader::DownloadStream,
    upload::UploadSessionStream,
    RemotePath, Result,
};
use std::sync::Arc;
use tracing::debug;

/// Value produced for a resolved binding
#[derive(Debug)]
pub enum Resolved {
    /// Download stream, or `None` when the file does not exist
    Read(Option<DownloadStream>),
    /// Buffered upload committing to the bound path
    Write(BufferedUpload<UploadSessionStream>),
}

/// Produces read streams and upload streams over a shared session client
#[derive(Debug, Clone)]
pub struct AccessResolver {
    client: Arc<dyn SessionClient>,
    upload: UploadConfig,
}

impl AccessResolver {
    /// Create a resolver with default upload settings
    pub fn new(client: Arc<dyn SessionClient>) -> Self {
        Self::with_config(client, UploadConfig::default())
    }

    pub fn with_config(client: Arc<dyn SessionClient>, upload: UploadConfig) -> Self {
        Self { client, upload }
    }

    pub fn client(&self) -> &Arc<dyn SessionClient> {
        &self.client
    }

    /// Open the file at `path` for reading
    ///
    /// A missing file yields `Ok(None)`. Every other fault is returned as-is.
    pub async fn resolve_read(&self, path: &RemotePath) -> Result<Option<DownloadStream>> {
        match self.client.download(path).await {
            Ok(stream) => Ok(Some(stream)),
            Err(e) if is_not_found(&e) => {
                debug!(path = %path, "Remote file not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Unbuffered upload stream committing to `path`
    pub fn resolve_write(&self, path: &RemotePath) -> UploadSessionStream {
        let target = UploadTarget::with_policy(path.clone(), self.upload.conflict_policy);
        UploadSessionStream::new(Arc::clone(&self.client), target)
    }

    /// Upload stream behind a write buffer sized by the upload settings
    pub fn resolve_write_buffered(&self, path: &RemotePath) -> BufferedUpload<UploadSessionStream> {
        BufferedUpload::new(self.resolve_write(path), self.upload.buffer_capacity())
    }

    /// Resolve a decided binding
    pub async fn resolve(&self, decision: &AccessDecision) -> Result<Resolved> {
        match decision.direction() {
            Direction::Read => Ok(Resolved::Read(self.resolve_read(decision.path()).await?)),
            Direction::Write => Ok(Resolved::Write(self.resolve_write_buffered(decision.path()))),
        }
    }
}
