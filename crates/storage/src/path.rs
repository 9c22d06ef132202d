//! Key validation for filesystem-backed stores.
//!
//! Object keys are flat strings, but [`LocalBackend`](crate::backend::LocalBackend)
//! maps them onto a directory tree. This module makes sure a key can never
//! resolve to a location outside of the store root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Converts an object key into a relative path that stays inside the store
/// root (no `..` traversal, no absolute prefixes).
///
/// > **Note:** Only `/` is treated as a separator by object stores; on Unix
/// >           that is also the only separator [`Path`] understands. Null
/// >           bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ferry_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("labels/running/vid1.mp4").is_ok());
/// assert!(validate_key("labels/../vid1.mp4").is_ok()); // (never leaves store root)
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("labels//./running/vid1.mp4").unwrap(), Path::new("labels/running/vid1.mp4"));
/// ```
pub fn validate(key: impl AsRef<Path>) -> Result<PathBuf> {
    let key = key.as_ref();
    let mut components = Vec::new();
    for component in key.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(key.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(key.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(key.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(key.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
