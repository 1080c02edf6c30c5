//! Tokio runtime management for synchronous operations
//!
//! Blocking adapters drive async calls on a shared runtime. This module is the
//! only place that blocks a thread on a future.

use crate::{BindError, Result};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, warn};

/// Get or create the shared Tokio runtime used by blocking adapters
pub fn shared_runtime() -> Result<Arc<Runtime>> {
    static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();
    static INIT: Mutex<()> = Mutex::new(());

    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.clone());
    }

    // A second runtime must never be built and dropped inside an async context.
    let _init = INIT
        .lock()
        .map_err(|_| BindError::Runtime("runtime initialization poisoned".to_string()))?;
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.clone());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("dropbind-worker")
        .build()
        .map_err(|e| BindError::Runtime(format!("Failed to create Tokio runtime: {}", e)))?;

    Ok(RUNTIME.get_or_init(|| Arc::new(runtime)).clone())
}

/// Run `future` to completion on the shared runtime
///
/// Fails instead of panicking when called from inside an async context.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = shared_runtime()?;
    block_on_with(&runtime, future)
}

pub(crate) fn block_on_with<F: Future>(runtime: &Runtime, future: F) -> Result<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(BindError::Runtime(
            "cannot block on a remote call from inside an async context".to_string(),
        ));
    }
    Ok(runtime.block_on(future))
}

/// Finish an upload whose owner can no longer await it
///
/// Spawned on the current runtime when there is one, otherwise run to
/// completion on the shared runtime. Errors can only be logged.
pub(crate) fn finish_detached(path: String, finish: BoxFuture<'static, Result<u64>>) {
    let task = async move {
        match finish.await {
            Ok(bytes) => debug!(path = %path, bytes, "Finished detached upload"),
            Err(e) => warn!(path = %path, error = %e, "Failed to finish detached upload"),
        }
    };

    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => match shared_runtime() {
            Ok(runtime) => runtime.block_on(task),
            Err(e) => warn!(error = %e, "No runtime available to finish detached upload"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_shared_runtime() {
        assert_eq!(block_on(async { 7 }).unwrap(), 7);
        assert!(Arc::ptr_eq(&shared_runtime().unwrap(), &shared_runtime().unwrap()));
    }

    #[tokio::test]
    async fn test_block_on_inside_async_fails() {
        assert!(matches!(block_on(async {}), Err(BindError::Runtime(_))));
    }
}
