//! Remote path grammar
//!
//! A remote path is one of:
//! - an absolute path starting with `/` (any characters, newlines included)
//! - a namespace-relative path `ns:<digits>` optionally followed by `/...`
//! - a file id `id:...`
//!
//! Only the absolute form may span lines.

use crate::{BindError, Result};
use std::fmt;

/// A validated remote path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    raw: String,
    kind: PathKind,
}

/// The syntactic form of a [`RemotePath`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// `/folder/file.txt`
    Absolute,
    /// `ns:1234/folder/file.txt`
    Namespace,
    /// `id:a4ayc_80_OEAAAAAAAAAXw`
    Id,
}

impl RemotePath {
    /// Parse and validate a remote path
    pub fn parse(raw: &str) -> Result<Self> {
        let kind = classify(raw).ok_or_else(|| BindError::InvalidPath(format!("{:?}", raw)))?;
        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }

    /// The path exactly as declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Syntactic form of this path
    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// Non-empty segments of the path
    ///
    /// For namespace and id paths the qualifier (`ns:42`, `id:abc`) is the
    /// leading segment. An absolute path can have the same segments, so use
    /// [`kind`](Self::kind) as well when mapping paths to storage keys.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let (head, rest) = match self.kind {
            PathKind::Absolute => (None, self.raw.as_str()),
            PathKind::Namespace => match self.raw.find('/') {
                Some(idx) => (Some(&self.raw[..idx]), &self.raw[idx..]),
                None => (Some(self.raw.as_str()), ""),
            },
            PathKind::Id => (Some(self.raw.as_str()), ""),
        };
        head.into_iter()
            .chain(rest.split('/'))
            .filter(|segment| !segment.is_empty())
    }
}

fn classify(raw: &str) -> Option<PathKind> {
    if raw.starts_with('/') {
        return Some(PathKind::Absolute);
    }

    if raw.contains('\n') {
        return None;
    }

    if let Some(rest) = raw.strip_prefix("ns:") {
        let digits = rest.find('/').map_or(rest, |idx| &rest[..idx]);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Some(PathKind::Namespace);
        }
        return None;
    }

    if raw.starts_with("id:") {
        return Some(PathKind::Id);
    }

    None
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for RemotePath {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
