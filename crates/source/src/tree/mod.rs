//! Source tree trait and implementations.
//!
//! A source tree is the read-only, hierarchical side of a transfer: folders
//! (containers) holding further folders or media items (leaves). It only
//! needs to do two things: list the direct children of a container, and
//! stream the bytes of a leaf.

#[cfg(feature = "drive")]
mod drive;
mod local;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "drive")]
pub use self::drive::DriveTree;
pub use self::local::LocalTree;
#[cfg(feature = "mock")]
pub use self::mock::MockTree;
use crate::error::Result;
use crate::{NodeId, SourceNode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// The bytes of one leaf, delivered in chunks of at most the requested size.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Unified interface for hierarchical sources.
///
/// # Examples
///
/// ```
/// use ferry_source::{SourceTree, error::Result};
///
/// async fn count_top_level_folders(tree: &dyn SourceTree) -> Result<usize> {
///     let children = tree.list_children(&tree.root()).await?;
///     Ok(children.iter().filter(|node| node.is_container()).count())
/// }
/// ```
#[async_trait]
pub trait SourceTree: Send + Sync {
    /// Name of the configured source (used for logging only).
    fn name(&self) -> &str;

    /// Identifier of the container the traversal starts from.
    fn root(&self) -> NodeId;

    /// List the direct children of a container, in no particular order.
    ///
    /// Every child is returned, whatever its kind or name; filtering is the
    /// caller's business.
    async fn list_children(&self, container: &NodeId) -> Result<Vec<SourceNode>>;

    /// Start fetching the content of a leaf.
    ///
    /// Every call opens a brand new connection (or file handle); nothing is
    /// shared with an earlier, possibly broken, call for the same leaf.
    /// Chunks are yielded as soon as they arrive and are never larger than
    /// `chunk_size`. A failure part-way through is yielded as an `Err` item,
    /// after which the stream ends.
    async fn open(&self, leaf: &SourceNode, chunk_size: usize) -> Result<ChunkStream>;
}
