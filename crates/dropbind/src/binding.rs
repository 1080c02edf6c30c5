//! Binding surface: from declared bindings to bound values
//!
//! A [`FileBinding`] is what a job declares on a parameter or return value.
//! [`Binder`] resolves its path template against the invocation parameters,
//! decides the access direction and hands the value back.

use crate::{
    access::{AccessDecision, FileAccess, ValueShape},
    buffer::BufferedUpload,
    client::SessionClient,
    config::Config,
    reader::DownloadStream,
    resolver::{AccessResolver, Resolved},
    upload::{UploadSessionStream, UploadSink},
    BindError, RemotePath, Result,
};
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a connection string into a session client
pub trait ClientFactory: Send + Sync + fmt::Debug {
    fn connect(&self, connection: &str) -> Result<Arc<dyn SessionClient>>;
}

/// Factory that hands out one pre-built client for every connection
#[derive(Debug, Clone)]
pub struct FixedClientFactory(pub Arc<dyn SessionClient>);

impl ClientFactory for FixedClientFactory {
    fn connect(&self, _connection: &str) -> Result<Arc<dyn SessionClient>> {
        Ok(Arc::clone(&self.0))
    }
}

/// A declared binding to a remote file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBinding {
    /// Path template such as `/{folder}/{name}.txt`; `None` binds the client itself
    pub path: Option<String>,
    /// Explicit direction; required when binding a raw stream
    pub access: Option<FileAccess>,
    /// Connection override for this binding
    pub connection: Option<String>,
}

impl FileBinding {
    /// Binding to the session client rather than a file
    pub fn client() -> Self {
        Self::default()
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_access(path: impl Into<String>, access: FileAccess) -> Self {
        Self {
            path: Some(path.into()),
            access: Some(access),
            ..Self::default()
        }
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

/// Value handed to a job for a binding
#[derive(Debug)]
pub enum BoundValue {
    Client(Arc<dyn SessionClient>),
    Read(Option<DownloadStream>),
    Write(BufferedUpload<UploadSessionStream>),
}

/// Replace `{name}` placeholders in `template` with invocation parameters
pub fn resolve_template(template: &str, params: &HashMap<String, String>) -> Result<String> {
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            BindError::Config(format!("Unclosed '{{' in path template: {}", template))
        })?;

        let name = after[..close].trim();
        let value = params.get(name).ok_or_else(|| {
            BindError::Config(format!(
                "Path template {} references unknown parameter '{}'",
                template, name
            ))
        })?;
        resolved.push_str(value);
        rest = &after[close + 1..];
    }

    if rest.contains('}') {
        return Err(BindError::Config(format!(
            "Unmatched '}}' in path template: {}",
            template
        )));
    }
    resolved.push_str(rest);
    Ok(resolved)
}

/// Pick the connection for a binding: its own, else the configured default
///
/// A connection containing `://` is used as a store URL. Anything else names
/// an environment variable that holds the URL.
pub fn resolve_connection(declared: Option<&str>, config: &Config) -> Result<String> {
    let connection = declared
        .or(config.connection.default.as_deref())
        .ok_or_else(|| {
            BindError::Config(
                "No connection configured: set one on the binding or in [connection] default"
                    .to_string(),
            )
        })?;

    if connection.contains("://") {
        return Ok(connection.to_string());
    }

    std::env::var(connection).map_err(|_| {
        BindError::Config(format!(
            "Connection setting '{}' is not set in the environment",
            connection
        ))
    })
}

/// Resolves declared bindings into bound values
#[derive(Debug, Clone)]
pub struct Binder {
    config: Config,
    factory: Arc<dyn ClientFactory>,
}

impl Binder {
    pub fn new(config: Config, factory: Arc<dyn ClientFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session client for the binding's connection
    pub fn client(&self, binding: &FileBinding) -> Result<Arc<dyn SessionClient>> {
        let connection = resolve_connection(binding.connection.as_deref(), &self.config)?;
        self.factory.connect(&connection)
    }

    pub fn resolver(&self, binding: &FileBinding) -> Result<AccessResolver> {
        Ok(AccessResolver::with_config(
            self.client(binding)?,
            self.config.upload.clone(),
        ))
    }

    /// Resolve the binding's path template and validate the result
    pub fn path(&self, binding: &FileBinding, params: &HashMap<String, String>) -> Result<RemotePath> {
        let template = binding.path.as_deref().ok_or_else(|| {
            BindError::Config("Binding has no path".to_string())
        })?;
        RemotePath::parse(&resolve_template(template, params)?)
    }

    /// Decide how a file binding is accessed
    pub fn decide(
        &self,
        binding: &FileBinding,
        shape: ValueShape,
        params: &HashMap<String, String>,
    ) -> Result<AccessDecision> {
        AccessDecision::decide(self.path(binding, params)?, binding.access, shape)
    }

    /// Bind a value of `shape` for one invocation
    ///
    /// A binding with neither path nor access binds the client. Access
    /// without a path is rejected.
    pub async fn bind(
        &self,
        binding: &FileBinding,
        shape: ValueShape,
        params: &HashMap<String, String>,
    ) -> Result<BoundValue> {
        match (&binding.path, binding.access) {
            (None, None) => return Ok(BoundValue::Client(self.client(binding)?)),
            (None, Some(_)) => {
                return Err(BindError::Config(
                    "Binding declares access but no path".to_string(),
                ))
            }
            _ => {}
        }

        let decision = self.decide(binding, shape, params)?;
        debug!(path = %decision.path(), direction = ?decision.direction(), "Resolving binding");
        match self.resolver(binding)?.resolve(&decision).await? {
            Resolved::Read(stream) => Ok(BoundValue::Read(stream)),
            Resolved::Write(upload) => Ok(BoundValue::Write(upload)),
        }
    }

    async fn open_read(
        &self,
        binding: &FileBinding,
        shape: ValueShape,
        params: &HashMap<String, String>,
    ) -> Result<Option<DownloadStream>> {
        match self.bind(binding, shape, params).await? {
            BoundValue::Read(stream) => Ok(stream),
            _ => Err(BindError::Config(format!(
                "Binding {:?} does not resolve to a read",
                binding.path
            ))),
        }
    }

    async fn open_write(
        &self,
        binding: &FileBinding,
        shape: ValueShape,
        params: &HashMap<String, String>,
    ) -> Result<BufferedUpload<UploadSessionStream>> {
        match self.bind(binding, shape, params).await? {
            BoundValue::Write(upload) => Ok(upload),
            _ => Err(BindError::Config(format!(
                "Binding {:?} does not resolve to a write",
                binding.path
            ))),
        }
    }

    /// Whole file as bytes, `None` if it does not exist
    pub async fn read_bytes(
        &self,
        binding: &FileBinding,
        params: &HashMap<String, String>,
    ) -> Result<Option<Bytes>> {
        match self.open_read(binding, ValueShape::Bytes, params).await? {
            Some(stream) => Ok(Some(stream.bytes().await?)),
            None => Ok(None),
        }
    }

    /// Whole file as text, `None` if it does not exist
    pub async fn read_text(
        &self,
        binding: &FileBinding,
        params: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        match self.open_read(binding, ValueShape::Text, params).await? {
            Some(stream) => Ok(Some(stream.text().await?)),
            None => Ok(None),
        }
    }

    /// Write a job's output value; `None` writes nothing
    ///
    /// Returns the number of bytes committed.
    pub async fn write_value(
        &self,
        binding: &FileBinding,
        params: &HashMap<String, String>,
        value: Option<&[u8]>,
    ) -> Result<Option<u64>> {
        let Some(value) = value else {
            debug!(path = ?binding.path, "No value returned, nothing written");
            return Ok(None);
        };

        let mut upload = self.open_write(binding, ValueShape::Return, params).await?;
        let written = upload.write(value).await;
        let closed = upload.close().await;
        written?;
        closed.map(Some)
    }

    /// Stream the file bound by `src` into the file bound by `dest`
    ///
    /// Returns `None` without touching `dest` if the source does not exist.
    /// The destination is finished on every path; on a copy error whatever
    /// was sent is committed and the error returned.
    pub async fn copy(
        &self,
        src: &FileBinding,
        dest: &FileBinding,
        params: &HashMap<String, String>,
    ) -> Result<Option<u64>> {
        let Some(mut source) = self.open_read(src, ValueShape::Stream, params).await? else {
            return Ok(None);
        };

        let mut upload = self.open_write(dest, ValueShape::Stream, params).await?;
        let copied = async {
            while let Some(chunk) = source.next().await {
                upload.write_chunk(chunk?).await?;
            }
            Ok::<_, BindError>(())
        }
        .await;
        let closed = upload.close().await;
        copied?;

        let bytes = closed?;
        info!(src = %source.path(), bytes, "Copied remote file");
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HashMap<String, String> {
        HashMap::from([
            ("folder".to_string(), "docs".to_string()),
            ("name".to_string(), "test".to_string()),
        ])
    }

    #[test]
    fn test_resolve_template() {
        assert_eq!(
            resolve_template("/{folder}/{name}.txt", &params()).unwrap(),
            "/docs/test.txt"
        );
        assert_eq!(
            resolve_template("/{folder}/copy-{name}.txt", &params()).unwrap(),
            "/docs/copy-test.txt"
        );
        assert_eq!(resolve_template("/plain.txt", &params()).unwrap(), "/plain.txt");
    }

    #[test]
    fn test_resolve_template_errors() {
        assert!(resolve_template("/{missing}.txt", &params()).is_err());
        assert!(resolve_template("/{folder.txt", &params()).is_err());
        assert!(resolve_template("/folder}.txt", &params()).is_err());
    }

    #[test]
    fn test_resolve_connection() {
        let mut config = Config::default();
        assert!(resolve_connection(None, &config).is_err());

        config.connection.default = Some("memory:///".to_string());
        assert_eq!(resolve_connection(None, &config).unwrap(), "memory:///");
        assert_eq!(
            resolve_connection(Some("file:///tmp/x"), &config).unwrap(),
            "file:///tmp/x"
        );
        assert!(resolve_connection(Some("DROPBIND_TEST_UNSET_SETTING"), &config).is_err());
    }
}
