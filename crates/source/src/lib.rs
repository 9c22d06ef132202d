//! Hierarchical media sources.
//!
//! A source is a read-only tree of containers and leaves, such as a shared
//! Google Drive folder or a directory on disk. Everything the transfer
//! pipeline reads comes through a [`SourceTree`].

pub mod error;
mod models;
pub mod tree;

pub use crate::models::{NodeId, NodeKind, SourceNode};
pub use crate::tree::{ChunkStream, SourceTree};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SourceTree + Send + Sync>;
