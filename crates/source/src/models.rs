//! Source tree models.
//!
//! A [`SourceNode`] is a snapshot of one entry in the remote hierarchy, valid
//! for the duration of a single traversal. Nothing here is cached across runs.

use derive_more::Display;

/// Opaque, source-specific identifier of a node.
///
/// For Google Drive this is the file ID, for a local tree it is the path
/// relative to the tree root (the root itself being the empty string).
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);
impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Whether a node can have children.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Resolution or label folder
    #[display("container")]
    Container,
    /// One transferable media item
    #[display("leaf")]
    Leaf,
}

/// One entry of the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
    pub id: NodeId,
    /// Display name, as shown by the source (not necessarily unique).
    pub name: String,
    pub kind: NodeKind,
    /// Back-reference to the listing container. Only ever used to rebuild a
    /// path for logging; traversal never follows it.
    pub parent: Option<NodeId>,
    /// Size in bytes, when the source knows it (leaves only).
    pub size: Option<u64>,
}
impl SourceNode {
    pub fn container(id: impl Into<NodeId>, name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Container,
            parent,
            size: None,
        }
    }

    pub fn leaf(id: impl Into<NodeId>, name: impl Into<String>, parent: Option<NodeId>, size: Option<u64>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Leaf,
            parent,
            size,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// File extension of a leaf's display name, without the dot. Containers
    /// never have an extension.
    pub fn extension(&self) -> Option<&str> {
        if !self.is_leaf() {
            return None;
        }
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}
