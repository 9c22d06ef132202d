//! Destination object stores.
//!
//! Everything the transfer pipeline pushes ends up behind a
//! [`StorageBackend`]: a flat keyspace where each object is addressed by a
//! `/`-separated string key.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::ObjectInfo;
pub use crate::path::validate as validate_key;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
