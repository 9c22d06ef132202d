//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Source and storage errors are raised
//! into one of these kinds as they cross into the pipeline, so the original
//! failure stays reachable in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies pipeline failures by how far they reach.
///
/// ### Fatal to a subtree
/// - [`ErrorKind::Enumeration`] (fatal to the whole run only for the root)
///
/// ### Fatal to one task
/// - [`ErrorKind::Check`]
/// - [`ErrorKind::Download`], [`ErrorKind::Upload`] once the retry budget is spent
/// - [`ErrorKind::WorkerPanic`]
///
/// ### Retried
/// - [`ErrorKind::Transient`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A container of the source tree could not be listed.
    #[display("could not list container {_0}")]
    Enumeration(#[error(not(source))] String),
    /// The destination could not say whether a key exists.
    #[display("could not check destination key {_0}")]
    Check(#[error(not(source))] String),
    /// A single download or upload attempt failed.
    #[display("{_0}")]
    Transient(#[error(not(source))] String),
    /// Every download attempt failed.
    #[display("download of {leaf} failed after {attempts} attempt(s): {cause}")]
    Download { leaf: String, attempts: u32, cause: String },
    /// Every upload attempt failed.
    #[display("upload to {key} failed after {attempts} attempt(s): {cause}")]
    Upload { key: String, attempts: u32, cause: String },
    /// A worker panicked while handling a task.
    #[display("worker panicked: {_0}")]
    WorkerPanic(#[error(not(source))] String),
    /// The local staging area could not be prepared.
    #[display("staging area unavailable: {}", _0.display())]
    Staging(#[error(not(source))] PathBuf),
    /// Moving a file during a restructure failed.
    #[display("could not move {}", _0.display())]
    Restructure(#[error(not(source))] PathBuf),
    /// Settings the pipeline cannot run with.
    #[display("invalid transfer settings: {_0}")]
    Config(#[error(not(source))] String),
}

/// Raise `kind` from any lower-level error, keeping its message as the
/// cause.
pub(crate) fn transient<E>(err: exn::Exn<E>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = (*err).to_string();
    err.raise(ErrorKind::Transient(message))
}
