//! Three-level walk of a source tree: resolutions, labels, leaves.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ferry_source::{NodeId, SourceHandle, SourceNode};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Case-insensitive allow-list of leaf extensions (without the dot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions(Arc<BTreeSet<String>>);

impl Extensions {
    pub fn new(extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let set = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self(Arc::new(set))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `node` is a leaf with an allowed extension.
    pub fn allows(&self, node: &SourceNode) -> bool {
        node.extension().is_some_and(|ext| self.0.contains(&ext.to_ascii_lowercase()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new(["mp4", "mov", "avi", "mkv"])
    }
}

/// Leaves of one label folder, split by the allow-list.
#[derive(Debug, Default)]
pub struct LeafScan {
    pub accepted: Vec<SourceNode>,
    /// Number of children that were not an allowed leaf.
    pub rejected: usize,
}

/// Lists the resolution, label and leaf levels of a source tree.
///
/// Listings are never cached; every call goes back to the source. Results
/// are sorted by name so runs over the same tree process it in the same
/// order.
#[derive(Clone)]
pub struct SourceEnumerator {
    source: SourceHandle,
    extensions: Extensions,
}

impl SourceEnumerator {
    pub fn new(source: SourceHandle, extensions: Extensions) -> Self {
        Self { source, extensions }
    }

    /// Resolution folders directly under the source root.
    pub async fn resolutions(&self) -> Result<Vec<SourceNode>> {
        self.containers(&self.source.root()).await
    }

    /// Label folders of one resolution folder.
    pub async fn labels(&self, resolution: &SourceNode) -> Result<Vec<SourceNode>> {
        self.containers(&resolution.id).await
    }

    /// Allowed leaves of one label folder.
    pub async fn leaves(&self, label: &SourceNode) -> Result<Vec<SourceNode>> {
        Ok(self.scan_leaves(label).await?.accepted)
    }

    /// Like [`leaves()`](Self::leaves), also counting what was filtered out.
    pub async fn scan_leaves(&self, label: &SourceNode) -> Result<LeafScan> {
        let children = self.list(&label.id).await?;
        let total = children.len();
        let accepted: Vec<_> = children.into_iter().filter(|node| self.extensions.allows(node)).collect();
        Ok(LeafScan { rejected: total - accepted.len(), accepted })
    }

    async fn containers(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        let children = self.list(id).await?;
        Ok(children.into_iter().filter(SourceNode::is_container).collect())
    }

    async fn list(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        let mut children = self.source.list_children(id).await.or_raise(|| ErrorKind::Enumeration(id.to_string()))?;
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(children)
    }
}
