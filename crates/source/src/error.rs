//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A source tree error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Node does not exist (or is not visible with the given credentials)
    #[display("node not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credentials were rejected or have expired
    #[display("unauthorized: {_0}")]
    Unauthorized(#[error(not(source))] String),
    /// Connection, timeout or throttling failure
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The remote answered with something we couldn't make sense of
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Attempted to list the children of a leaf
    #[display("not a container: {_0}")]
    NotAContainer(#[error(not(source))] String),
    /// Attempted to download a container
    #[display("not a leaf: {_0}")]
    NotALeaf(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
