//! Testing utilities and fixtures for dropbind
//!
//! This crate provides a recording session client, fixtures and helpers
//! for testing code built on dropbind.

use async_trait::async_trait;
use bytes::Bytes;
use dropbind::{
    ApiError, ApiErrorKind, ConflictPolicy, DownloadStream, RemotePath, Result, SessionClient,
    SessionId, UploadCursor, UploadTarget,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;
use tokio::sync::Notify;

pub mod assertions;
pub mod fixtures;

/// A protocol call that reached the remote service and succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start {
        body: Vec<u8>,
    },
    Append {
        session_id: String,
        offset: u64,
        body: Vec<u8>,
    },
    Finish {
        session_id: String,
        offset: u64,
        path: String,
        policy: ConflictPolicy,
    },
    Download {
        path: String,
    },
}

/// Protocol operation, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Start,
    Append,
    Finish,
    Download,
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Start { .. } => Op::Start,
            Call::Append { .. } => Op::Append,
            Call::Finish { .. } => Op::Finish,
            Call::Download { .. } => Op::Download,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    files: HashMap<String, Vec<u8>>,
    sessions: HashMap<String, Vec<u8>>,
    failures: HashMap<Op, VecDeque<ApiError>>,
    holds: HashMap<Op, VecDeque<Arc<Notify>>>,
    next_session: u64,
}

/// In-memory session client that records every successful call
///
/// Sessions behave like the real protocol: offsets are checked, finished
/// sessions are gone, and finishing stores the concatenated chunks under
/// the destination path. Failures scripted with [`fail_next`](Self::fail_next)
/// are returned before the call has any effect and are not recorded. Calls
/// held with [`hold_next`](Self::hold_next) wait before doing anything, so
/// dropping one while it waits cancels it without effect.
#[derive(Debug, Default)]
pub struct RecordingClient {
    state: Mutex<State>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client ready to hand to streams and resolvers
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.insert_file(path, contents);
        self
    }

    pub fn insert_file(&self, path: &str, contents: &[u8]) {
        self.state().files.insert(path.to_string(), contents.to_vec());
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Op, error: ApiError) {
        self.state().failures.entry(op).or_default().push_back(error);
    }

    /// Make the next call of `op` wait until the returned handle is notified
    pub fn hold_next(&self, op: Op) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state()
            .holds
            .entry(op)
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|call| call.op() == op).count()
    }

    /// Committed contents of `path`
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Sessions started but not yet finished
    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("recording client state poisoned")
    }

    async fn wait_if_held(&self, op: Op) {
        let gate = self.state().holds.get_mut(&op).and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

impl State {
    fn take_failure(&mut self, op: Op) -> Result<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    fn session(&mut self, cursor: &UploadCursor) -> Result<&mut Vec<u8>> {
        let data = self
            .sessions
            .get_mut(cursor.session_id.as_str())
            .ok_or_else(|| {
                ApiError::new(ApiErrorKind::SessionNotFound, "lookup_failed/not_found/")
            })?;

        let received = data.len() as u64;
        if received != cursor.offset {
            return Err(ApiError::new(
                ApiErrorKind::IncorrectOffset {
                    correct_offset: received,
                },
                "lookup_failed/incorrect_offset/",
            )
            .into());
        }
        Ok(data)
    }
}

#[async_trait]
impl SessionClient for RecordingClient {
    async fn session_start(&self, body: Bytes) -> Result<SessionId> {
        self.wait_if_held(Op::Start).await;
        let mut state = self.state();
        state.take_failure(Op::Start)?;

        state.next_session += 1;
        let id = format!("session-{}", state.next_session);
        state.sessions.insert(id.clone(), body.to_vec());
        state.calls.push(Call::Start {
            body: body.to_vec(),
        });
        Ok(SessionId::new(id))
    }

    async fn session_append(&self, cursor: &UploadCursor, body: Bytes) -> Result<()> {
        self.wait_if_held(Op::Append).await;
        let mut state = self.state();
        state.take_failure(Op::Append)?;

        state.session(cursor)?.extend_from_slice(&body);
        state.calls.push(Call::Append {
            session_id: cursor.session_id.to_string(),
            offset: cursor.offset,
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn session_finish(&self, cursor: &UploadCursor, target: &UploadTarget) -> Result<()> {
        self.wait_if_held(Op::Finish).await;
        let mut state = self.state();
        state.take_failure(Op::Finish)?;

        state.session(cursor)?;
        let path = target.destination().to_string();
        if target.conflict_policy() == ConflictPolicy::Fail && state.files.contains_key(&path) {
            return Err(ApiError::new(ApiErrorKind::Conflict, "path/conflict/file/").into());
        }

        let data = state
            .sessions
            .remove(cursor.session_id.as_str())
            .unwrap_or_default();
        state.files.insert(path.clone(), data);
        state.calls.push(Call::Finish {
            session_id: cursor.session_id.to_string(),
            offset: cursor.offset,
            path,
            policy: target.conflict_policy(),
        });
        Ok(())
    }

    async fn download(&self, path: &RemotePath) -> Result<DownloadStream> {
        self.wait_if_held(Op::Download).await;
        let mut state = self.state();
        state.take_failure(Op::Download)?;

        let data = state
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| ApiError::path_not_found(path))?;
        state.calls.push(Call::Download {
            path: path.to_string(),
        });
        Ok(DownloadStream::from_bytes(path.clone(), data))
    }
}

/// A local-filesystem store in a temporary directory, removed on drop
#[derive(Debug)]
pub struct TestStore {
    dir: TempDir,
}

impl TestStore {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store URL usable as a connection string
    pub fn connection(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    /// Contents of a committed remote file, read straight from disk
    pub fn read(&self, remote: &str) -> anyhow::Result<Vec<u8>> {
        Ok(std::fs::read(self.dir.path().join(remote.trim_start_matches('/')))?)
    }
}

/// Install a test subscriber so `tracing` output shows up with `--nocapture`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(id: &str, offset: u64) -> UploadCursor {
        UploadCursor {
            session_id: SessionId::new(id),
            offset,
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let client = RecordingClient::new();
        let id = client.session_start(Bytes::from_static(b"ab")).await.unwrap();
        client
            .session_append(&cursor(id.as_str(), 2), Bytes::from_static(b"cd"))
            .await
            .unwrap();

        let target = UploadTarget::new(RemotePath::parse("/x.bin").unwrap());
        client.session_finish(&cursor(id.as_str(), 4), &target).await.unwrap();

        assert_eq!(client.file("/x.bin").unwrap(), b"abcd");
        assert_eq!(client.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_offset_mismatch_rejected() {
        let client = RecordingClient::new();
        let id = client.session_start(Bytes::from_static(b"ab")).await.unwrap();
        let err = client
            .session_append(&cursor(id.as_str(), 1), Bytes::from_static(b"c"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("incorrect_offset"));
    }

    #[tokio::test]
    async fn test_held_call_waits_for_release() {
        let client = Arc::new(RecordingClient::new());
        let gate = client.hold_next(Op::Start);

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.session_start(Bytes::from_static(b"a")).await }
        });
        tokio::task::yield_now().await;
        assert!(client.calls().is_empty());

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(client.count(Op::Start), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_is_not_recorded() {
        let client = RecordingClient::new();
        client.fail_next(Op::Start, ApiError::unclassified("too_many_write_operations"));
        assert!(client.session_start(Bytes::from_static(b"a")).await.is_err());
        assert!(client.calls().is_empty());
        assert!(client.session_start(Bytes::from_static(b"a")).await.is_ok());
        assert_eq!(client.count(Op::Start), 1);
    }
}
