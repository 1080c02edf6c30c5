//! # dropbind
//!
//! Remote file bindings over a session-based upload protocol. Reads come back
//! as byte streams (or nothing, when the file does not exist); writes go
//! through an upload session that is started by the first chunk, appended to
//! at a running offset and committed to its destination on close.
//!
//! ## Architecture
//!
//! The main abstractions are:
//! - `SessionClient`: the remote API (start/append/finish/download), shared between streams
//! - `UploadSessionStream`: async write-only stream mapping each write to one protocol call
//! - `BufferedUpload`: batches small writes into larger chunks
//! - `AccessResolver`: turns a read/write decision into a download or an upload
//! - `Binder`: resolves declared bindings with path templates and connections
//!
//! `BlockingUpload` and `BlockingDownload` bridge the async core to
//! `std::io::Write` and `std::io::Read` using a shared Tokio runtime.

#![warn(missing_debug_implementations)]

pub mod access;
pub mod binding;
mod buffer;
pub mod client;
pub mod config;
mod error;
mod not_found;
mod path;
mod reader;
pub mod resolver;
pub mod runtime;
pub mod store;
mod upload;
mod writer;

pub use access::{AccessDecision, Direction, FileAccess, ValueShape};
pub use binding::{Binder, BoundValue, ClientFactory, FileBinding, FixedClientFactory};
pub use buffer::BufferedUpload;
pub use client::{ConflictPolicy, SessionClient, SessionId, UploadCursor, UploadTarget};
pub use config::{Config, UploadConfig};
pub use error::{ApiError, ApiErrorKind, BindError, Result};
pub use not_found::{is_not_found, NOT_FOUND_SUMMARY};
pub use path::{PathKind, RemotePath};
pub use reader::{BlockingDownload, DownloadStream};
pub use resolver::{AccessResolver, Resolved};
pub use store::{ObjectStoreClient, StoreClientFactory};
pub use upload::{UploadSessionStream, UploadSink};
pub use writer::BlockingUpload;

// Re-export commonly used types from object_store
pub use object_store::{path::Path as ObjectPath, ObjectStore};
