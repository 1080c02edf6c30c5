//! Session client backed by an `object_store` backend
//!
//! Sessions are staged as multipart uploads under a private prefix and moved
//! to their destination when finished, so a destination never shows a
//! partially written file. Sessions left idle longer than the session TTL
//! are aborted the next time a session starts.
//!
//! Absolute paths map directly under the store root. Namespace and id paths
//! live under [`QUALIFIED_PREFIX`], and absolute paths may not enter either
//! reserved prefix.

use crate::{
    binding::ClientFactory,
    client::{ConflictPolicy, SessionClient, SessionId, UploadCursor, UploadTarget},
    reader::DownloadStream,
    ApiError, ApiErrorKind, BindError, PathKind, RemotePath, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::{Path, PathPart};
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Prefix under the store root where open sessions are staged
pub const SESSION_PREFIX: &str = "_upload_sessions";

/// Prefix under the store root holding namespace and id paths
pub const QUALIFIED_PREFIX: &str = "_qualified";

/// Idle time after which an unfinished session is aborted
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct StagedUpload {
    staging: Path,
    upload: Box<dyn MultipartUpload>,
    /// Bytes received so far
    received: u64,
    parts: usize,
    /// Last start or append
    touched: Instant,
}

/// A [`SessionClient`] over any [`ObjectStore`]
#[derive(Debug)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    root: Path,
    session_ttl: Duration,
    sessions: Mutex<HashMap<SessionId, Arc<AsyncMutex<StagedUpload>>>>,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_root(store, Path::default())
    }

    /// Client whose remote paths live under `root` in `store`
    pub fn with_root(store: Arc<dyn ObjectStore>, root: Path) -> Self {
        Self {
            store,
            root,
            session_ttl: DEFAULT_SESSION_TTL,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Abort sessions idle for longer than `ttl`
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Client over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Creates a client from a store URL
    ///
    /// Supports URLs like:
    /// - `memory:///`
    /// - `file:///srv/files`
    /// - `s3://bucket/prefix` (with the `aws` feature)
    pub fn from_url(connection: &str) -> Result<Self> {
        let url = Url::parse(connection)?;
        let (store, root) = object_store::parse_url(&url)?;
        Ok(Self::with_root(Arc::from(store), root))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Sessions started and neither finished nor expired
    pub fn open_sessions(&self) -> usize {
        self.sessions().map_or(0, |sessions| sessions.len())
    }

    /// Storage key of a remote path
    pub fn key(&self, path: &RemotePath) -> Result<Path> {
        let mut segments = path.segments().peekable();
        let first = segments
            .peek()
            .copied()
            .ok_or_else(|| BindError::InvalidPath(format!("{} names no file", path)))?;

        let prefix = match path.kind() {
            PathKind::Absolute => {
                if first == SESSION_PREFIX || first == QUALIFIED_PREFIX {
                    return Err(BindError::InvalidPath(format!(
                        "{} is inside the reserved prefix {}",
                        path, first
                    )));
                }
                None
            }
            PathKind::Namespace | PathKind::Id => Some(PathPart::from(QUALIFIED_PREFIX)),
        };

        Ok(Path::from_iter(
            self.root
                .parts()
                .chain(prefix)
                .chain(segments.map(PathPart::from)),
        ))
    }

    fn staging_key(&self, id: &SessionId) -> Path {
        let session = [PathPart::from(SESSION_PREFIX), PathPart::from(id.as_str())];
        Path::from_iter(self.root.parts().chain(session))
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Arc<AsyncMutex<StagedUpload>>>>> {
        self.sessions
            .lock()
            .map_err(|_| BindError::Runtime("upload session table poisoned".to_string()))
    }

    fn session(&self, id: &SessionId) -> Result<Arc<AsyncMutex<StagedUpload>>> {
        self.sessions()?.get(id).cloned().ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::SessionNotFound,
                format!("lookup_failed/not_found/ ({})", id),
            )
            .into()
        })
    }

    /// Remove idle sessions from the table and abort their staged uploads
    ///
    /// A session whose lock is held is in use and never counts as idle.
    async fn expire_sessions(&self) -> Result<()> {
        let expired: Vec<(SessionId, Arc<AsyncMutex<StagedUpload>>)> = {
            let mut sessions = self.sessions()?;
            let idle: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, session)| {
                    session
                        .try_lock()
                        .map_or(false, |staged| staged.touched.elapsed() >= self.session_ttl)
                })
                .map(|(id, _)| id.clone())
                .collect();
            idle.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|session| (id, session)))
                .collect()
        };

        for (id, session) in expired {
            let mut staged = session.lock().await;
            if let Err(e) = staged.upload.abort().await {
                warn!(session = %id, error = %e, "Failed to abort expired upload");
            }
            info!(session = %id, bytes = staged.received, "Expired idle upload session");
        }
        Ok(())
    }
}

fn check_offset(staged: &StagedUpload, offset: u64) -> Result<()> {
    if staged.received == offset {
        return Ok(());
    }
    Err(ApiError::new(
        ApiErrorKind::IncorrectOffset {
            correct_offset: staged.received,
        },
        format!("lookup_failed/incorrect_offset/ (expected {}, got {})", staged.received, offset),
    )
    .into())
}

#[async_trait]
impl SessionClient for ObjectStoreClient {
    async fn session_start(&self, body: Bytes) -> Result<SessionId> {
        self.expire_sessions().await?;

        let id = SessionId::new(Uuid::new_v4().to_string());
        let staging = self.staging_key(&id);
        let mut upload = self.store.put_multipart(&staging).await?;

        let received = body.len() as u64;
        let mut parts = 0;
        if !body.is_empty() {
            if let Err(e) = upload.put_part(PutPayload::from(body)).await {
                let _ = upload.abort().await;
                return Err(e.into());
            }
            parts = 1;
        }

        let staged = StagedUpload {
            staging,
            upload,
            received,
            parts,
            touched: Instant::now(),
        };
        self.sessions()?
            .insert(id.clone(), Arc::new(AsyncMutex::new(staged)));
        debug!(session = %id, bytes = received, "Opened staged upload");
        Ok(id)
    }

    async fn session_append(&self, cursor: &UploadCursor, body: Bytes) -> Result<()> {
        let session = self.session(&cursor.session_id)?;
        let mut staged = session.lock().await;
        check_offset(&staged, cursor.offset)?;

        if body.is_empty() {
            return Ok(());
        }
        let len = body.len() as u64;
        staged.upload.put_part(PutPayload::from(body)).await?;
        staged.parts += 1;
        staged.received += len;
        staged.touched = Instant::now();
        Ok(())
    }

    async fn session_finish(&self, cursor: &UploadCursor, target: &UploadTarget) -> Result<()> {
        let destination = self.key(target.destination())?;
        let session = self.session(&cursor.session_id)?;
        let mut staged = session.lock().await;
        check_offset(&staged, cursor.offset)?;
        self.sessions()?.remove(&cursor.session_id);

        if staged.parts == 0 {
            // Some backends reject a multipart upload without parts.
            if let Err(e) = staged.upload.abort().await {
                debug!(session = %cursor.session_id, error = %e, "Abort of empty upload failed");
            }
            self.store
                .put(&staged.staging, PutPayload::from(Bytes::new()))
                .await?;
        } else {
            staged.upload.complete().await?;
        }

        let committed = match target.conflict_policy() {
            ConflictPolicy::Overwrite => self.store.rename(&staged.staging, &destination).await,
            ConflictPolicy::Fail => {
                self.store
                    .rename_if_not_exists(&staged.staging, &destination)
                    .await
            }
        };

        match committed {
            Ok(()) => {
                debug!(path = %target.destination(), bytes = staged.received, "Committed upload");
                Ok(())
            }
            Err(object_store::Error::AlreadyExists { .. }) => {
                let _ = self.store.delete(&staged.staging).await;
                Err(ApiError::new(
                    ApiErrorKind::Conflict,
                    format!("path/conflict/file/ ({})", target.destination()),
                )
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, path: &RemotePath) -> Result<DownloadStream> {
        let key = self.key(path)?;
        let result = match self.store.get(&key).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ApiError::path_not_found(path).into())
            }
            Err(e) => return Err(e.into()),
        };

        let size = result.meta.size as u64;
        let chunks = result.into_stream().map_err(BindError::from).boxed();
        Ok(DownloadStream::new(path.clone(), Some(size), chunks))
    }
}

/// Builds [`ObjectStoreClient`]s from store URLs, one per distinct connection
#[derive(Debug, Default)]
pub struct StoreClientFactory {
    clients: Mutex<HashMap<String, Arc<dyn SessionClient>>>,
}

impl StoreClientFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for StoreClientFactory {
    fn connect(&self, connection: &str) -> Result<Arc<dyn SessionClient>> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| BindError::Runtime("client cache poisoned".to_string()))?;

        if let Some(client) = clients.get(connection) {
            return Ok(Arc::clone(client));
        }

        let client: Arc<dyn SessionClient> = Arc::new(ObjectStoreClient::from_url(connection)?);
        clients.insert(connection.to_string(), Arc::clone(&client));
        Ok(client)
    }
}
