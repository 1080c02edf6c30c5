//! Access direction of a binding
//!
//! The direction is decided once, when a binding is resolved, from explicit
//! metadata if the binding carries any, otherwise from the shape of the value
//! being bound.

use crate::{BindError, RemotePath, Result};
use serde::{Deserialize, Serialize};

/// Access declared on a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAccess {
    Read,
    Write,
    /// Accepted in declarations, rejected at resolution
    ReadWrite,
}

/// Resolved direction of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Shape of the value a job asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Raw byte stream; can go either way, so it needs explicit access
    Stream,
    /// Text reader over the file
    Reader,
    /// Whole file as bytes
    Bytes,
    /// Whole file as text
    Text,
    /// Text writer into the file
    Writer,
    /// Bytes produced by the job
    OutBytes,
    /// Text produced by the job
    OutText,
    /// The job's return value
    Return,
}

impl ValueShape {
    /// Direction implied by the shape alone
    pub fn implied_direction(self) -> Option<Direction> {
        match self {
            ValueShape::Stream => None,
            ValueShape::Reader | ValueShape::Bytes | ValueShape::Text => Some(Direction::Read),
            ValueShape::Writer | ValueShape::OutBytes | ValueShape::OutText | ValueShape::Return => {
                Some(Direction::Write)
            }
        }
    }
}

/// A binding's path and the direction it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    direction: Direction,
    path: RemotePath,
}

impl AccessDecision {
    pub fn read(path: RemotePath) -> Self {
        Self {
            direction: Direction::Read,
            path,
        }
    }

    pub fn write(path: RemotePath) -> Self {
        Self {
            direction: Direction::Write,
            path,
        }
    }

    /// Decide the direction for binding `path` to a value of `shape`
    ///
    /// Explicit access wins but must agree with shapes that only go one way.
    /// `ReadWrite` and a bare stream without access are configuration errors.
    pub fn decide(path: RemotePath, access: Option<FileAccess>, shape: ValueShape) -> Result<Self> {
        let implied = shape.implied_direction();

        let direction = match access {
            Some(FileAccess::ReadWrite) => {
                return Err(BindError::Config(format!(
                    "Cannot bind {} using ReadWrite access: must be either read or write",
                    path
                )))
            }
            Some(explicit) => {
                let direction = if explicit == FileAccess::Read {
                    Direction::Read
                } else {
                    Direction::Write
                };
                if implied.is_some_and(|implied| implied != direction) {
                    return Err(BindError::Config(format!(
                        "Access {:?} on {} conflicts with a {:?} value",
                        explicit, path, shape
                    )));
                }
                direction
            }
            None => implied.ok_or_else(|| {
                BindError::Config(format!(
                    "Binding {} to a stream requires an explicit access direction",
                    path
                ))
            })?,
        };

        Ok(Self { direction, path })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }
}
