//! Local filesystem source tree.
//!
//! Treats a directory on disk as a source hierarchy: sub-directories are
//! containers, regular files are leaves. Used by the restructure utility and
//! for transfers out of an already extracted dataset.

use crate::error::{ErrorKind, Result};
use crate::tree::ChunkStream;
use crate::{NodeId, SourceNode, SourceTree};
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Local filesystem source tree.
///
/// Node identifiers are `/`-separated paths relative to the root; the root
/// itself is the empty identifier.
///
/// # Examples
///
/// ```no_run
/// use ferry_source::{SourceTree, tree::LocalTree};
///
/// # async fn example() -> ferry_source::error::Result<()> {
/// let tree = LocalTree::new("extracted", "/data/Kinetics600_Dataset")?;
/// let resolutions = tree.list_children(&tree.root()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalTree {
    name: String,
    root: PathBuf,
}
impl LocalTree {
    /// Create a tree rooted at an existing directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            exn::bail!(ErrorKind::NotFound(root.display().to_string()));
        }
        Ok(Self { name: name.into(), root })
    }

    /// The directory this tree is rooted at.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a node. Identifiers that would step outside of the
    /// root are treated as unknown nodes.
    pub fn absolute_path(&self, id: &NodeId) -> Result<PathBuf> {
        let relative = Path::new(id.as_str());
        if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn child_id(parent: &NodeId, name: &str) -> NodeId {
        match parent.as_str() {
            "" => NodeId::new(name),
            parent => NodeId::new(format!("{parent}/{name}")),
        }
    }

    fn map_io_error(e: std::io::Error, id: &NodeId) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(id.to_string()),
            std::io::ErrorKind::NotADirectory => ErrorKind::NotAContainer(id.to_string()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl SourceTree for LocalTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> NodeId {
        NodeId::new("")
    }

    async fn list_children(&self, container: &NodeId) -> Result<Vec<SourceNode>> {
        let dir = self.absolute_path(container)?;
        let mut entries = fs::read_dir(&dir).await.map_err(|e| Self::map_io_error(e, container))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, container))? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(source = %self.name, path = %entry.path().display(), "Skipping non-UTF-8 file name");
                continue;
            };
            // Follows symlinks, unlike DirEntry::file_type().
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(
                        source = %self.name,
                        path = %entry.path().display(),
                        error = %e,
                        "Skipping unreadable entry"
                    );
                    continue;
                },
            };
            let id = Self::child_id(container, &name);
            let parent = Some(container.clone());
            if metadata.is_dir() {
                children.push(SourceNode::container(id, name, parent));
            } else if metadata.is_file() {
                children.push(SourceNode::leaf(id, name, parent, Some(metadata.len())));
            }
        }
        Ok(children)
    }

    async fn open(&self, leaf: &SourceNode, chunk_size: usize) -> Result<ChunkStream> {
        if !leaf.is_leaf() {
            exn::bail!(ErrorKind::NotALeaf(leaf.id.to_string()));
        }
        let path = self.absolute_path(&leaf.id)?;
        let mut file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, &leaf.id))?;
        let chunk_size = chunk_size.max(1);
        Ok(Box::pin(stream! {
            let mut buffer = vec![0u8; chunk_size];
            loop {
                match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(Bytes::copy_from_slice(&buffer[..n])),
                    Err(e) => {
                        yield Err(exn::Exn::from(ErrorKind::Io(e)));
                        break;
                    },
                }
            }
        }))
    }
}
