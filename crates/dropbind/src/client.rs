//! Session client contract for the remote file service

use crate::{reader::DownloadStream, RemotePath, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque id of a server-side upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position inside an upload session: the id plus the bytes already acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCursor {
    pub session_id: SessionId,
    pub offset: u64,
}

/// What happens when the destination of a finished upload already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Fail the commit and keep the existing file
    Fail,
}

/// Final destination of an upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    destination: RemotePath,
    conflict_policy: ConflictPolicy,
}

impl UploadTarget {
    /// Target `destination`, overwriting whatever is there
    pub fn new(destination: RemotePath) -> Self {
        Self::with_policy(destination, ConflictPolicy::default())
    }

    pub fn with_policy(destination: RemotePath, conflict_policy: ConflictPolicy) -> Self {
        Self {
            destination,
            conflict_policy,
        }
    }

    pub fn destination(&self) -> &RemotePath {
        &self.destination
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }
}

/// The remote file-storage API consumed by streams and resolvers
///
/// Implementations are shared between many streams, one per logical file,
/// and must be safe for concurrent use across distinct sessions.
#[async_trait]
pub trait SessionClient: Send + Sync + fmt::Debug {
    /// Open a session whose first chunk is `body`
    async fn session_start(&self, body: Bytes) -> Result<SessionId>;

    /// Append `body` at `cursor.offset`, which must equal the bytes sent so far
    async fn session_append(&self, cursor: &UploadCursor, body: Bytes) -> Result<()>;

    /// Commit everything sent to the session to `target`
    async fn session_finish(&self, cursor: &UploadCursor, target: &UploadTarget) -> Result<()>;

    /// Open a byte stream over the file at `path`
    ///
    /// A missing file is reported as an error that
    /// [`is_not_found`](crate::is_not_found) recognizes.
    async fn download(&self, path: &RemotePath) -> Result<DownloadStream>;
}
