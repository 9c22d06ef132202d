//! In-memory source tree for testing.

use crate::error::{ErrorKind, Result};
use crate::tree::ChunkStream;
use crate::{NodeId, SourceNode, SourceTree};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct Faults {
    /// Containers whose listing always fails.
    broken_listings: HashSet<NodeId>,
    /// Remaining number of downloads that break part-way, per leaf.
    failing_downloads: HashMap<NodeId, usize>,
    /// Leaves whose download panics instead of returning.
    panicking_downloads: HashSet<NodeId>,
    /// Number of `open()` calls seen, per leaf.
    download_attempts: HashMap<NodeId, usize>,
    /// How long every `open()` takes.
    download_delay: Duration,
    active_downloads: usize,
    peak_downloads: usize,
    /// Ticks once per `open()` start and once per `open()` end.
    clock: usize,
    /// Start and end tick of the latest `open()`, per leaf.
    windows: HashMap<NodeId, (usize, usize)>,
}

impl Faults {
    fn tick(&mut self) -> usize {
        self.clock += 1;
        self.clock
    }
}

/// In-memory source tree for testing.
///
/// Built up with `with_*` calls, each naming the parent container. Faults
/// can be injected per node to exercise retry and isolation paths.
///
/// # Examples
///
/// ```
/// use ferry_source::{NodeId, SourceTree, tree::MockTree};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferry_source::error::Result<()> {
/// let tree = MockTree::new("root")
///     .with_folder("root", "res-200", "200")
///     .with_folder("res-200", "lbl-running", "running")
///     .with_file("lbl-running", "f-1", "vid1.mp4", b"video".to_vec());
/// let labels = tree.list_children(&NodeId::from("res-200")).await?;
/// assert_eq!(labels[0].name, "running");
/// # Ok(())
/// # }
/// ```
pub struct MockTree {
    name: String,
    root: NodeId,
    nodes: HashMap<NodeId, SourceNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
    contents: HashMap<NodeId, Bytes>,
    faults: Mutex<Faults>,
}

impl MockTree {
    /// Create an empty tree whose root container has the given identifier.
    pub fn new(root: impl Into<NodeId>) -> Self {
        let root = root.into();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), SourceNode::container(root.clone(), "", None));
        Self {
            name: "mock".to_string(),
            root,
            nodes,
            children: HashMap::new(),
            contents: HashMap::new(),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Change the name of the mock tree.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a container under `parent`.
    pub fn with_folder(self, parent: impl Into<NodeId>, id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        let parent = parent.into();
        let node = SourceNode::container(id, name, Some(parent.clone()));
        self.insert(parent, node, None)
    }

    /// Add a leaf with the given content under `parent`.
    pub fn with_file(
        self,
        parent: impl Into<NodeId>,
        id: impl Into<NodeId>,
        name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let parent = parent.into();
        let content = content.into();
        let node = SourceNode::leaf(id, name, Some(parent.clone()), Some(content.len() as u64));
        self.insert(parent, node, Some(content))
    }

    /// Make every listing of `container` fail.
    pub fn with_broken_listing(mut self, container: impl Into<NodeId>) -> Self {
        self.faults.get_mut().broken_listings.insert(container.into());
        self
    }

    /// Make the next `times` downloads of `leaf` break after the first chunk.
    /// Use [`usize::MAX`] for a leaf that can never be downloaded.
    pub fn with_failing_downloads(mut self, leaf: impl Into<NodeId>, times: usize) -> Self {
        self.faults.get_mut().failing_downloads.insert(leaf.into(), times);
        self
    }

    /// Make any download of `leaf` panic.
    pub fn with_panicking_download(mut self, leaf: impl Into<NodeId>) -> Self {
        self.faults.get_mut().panicking_downloads.insert(leaf.into());
        self
    }

    /// Make every [`open()`](SourceTree::open) take `delay` before it returns.
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.faults.get_mut().download_delay = delay;
        self
    }

    /// Highest number of [`open()`](SourceTree::open) calls seen in flight
    /// at the same time.
    pub async fn peak_concurrent_downloads(&self) -> usize {
        self.faults.lock().await.peak_downloads
    }

    /// Start and end tick of the latest [`open()`](SourceTree::open) of
    /// `leaf`. Ticks are shared by all leaves, so windows can be ordered.
    pub async fn download_window(&self, leaf: impl Into<NodeId>) -> Option<(usize, usize)> {
        self.faults.lock().await.windows.get(&leaf.into()).copied()
    }

    /// Number of times [`open()`](SourceTree::open) was called for `leaf`.
    pub async fn download_attempts(&self, leaf: impl Into<NodeId>) -> usize {
        self.faults.lock().await.download_attempts.get(&leaf.into()).copied().unwrap_or(0)
    }

    /// Total number of [`open()`](SourceTree::open) calls, across all leaves.
    pub async fn total_download_attempts(&self) -> usize {
        self.faults.lock().await.download_attempts.values().sum()
    }

    fn insert(mut self, parent: NodeId, node: SourceNode, content: Option<Bytes>) -> Self {
        // The panic here is DELIBERATE. MockTree is intended to be used in
        // tests; if test setup is wrong, then test should not pass.
        assert!(self.nodes.get(&parent).is_some_and(SourceNode::is_container), "MockTree: unknown container {parent}");
        assert!(!self.nodes.contains_key(&node.id), "MockTree: duplicate node {}", node.id);
        self.children.entry(parent).or_default().push(node.id.clone());
        if let Some(content) = content {
            self.contents.insert(node.id.clone(), content);
        }
        self.nodes.insert(node.id.clone(), node);
        self
    }
}

#[async_trait]
impl SourceTree for MockTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> NodeId {
        self.root.clone()
    }

    async fn list_children(&self, container: &NodeId) -> Result<Vec<SourceNode>> {
        if self.faults.lock().await.broken_listings.contains(container) {
            exn::bail!(ErrorKind::Network(format!("injected listing failure for {container}")));
        }
        match self.nodes.get(container) {
            None => exn::bail!(ErrorKind::NotFound(container.to_string())),
            Some(node) if !node.is_container() => exn::bail!(ErrorKind::NotAContainer(container.to_string())),
            Some(_) => {},
        }
        let children = self.children.get(container).map(Vec::as_slice).unwrap_or_default();
        Ok(children.iter().filter_map(|id| self.nodes.get(id)).cloned().collect())
    }

    async fn open(&self, leaf: &SourceNode, chunk_size: usize) -> Result<ChunkStream> {
        let content = self
            .contents
            .get(&leaf.id)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotALeaf(leaf.id.to_string())))?;
        let (fail_midway, delay) = {
            let mut faults = self.faults.lock().await;
            *faults.download_attempts.entry(leaf.id.clone()).or_default() += 1;
            if faults.panicking_downloads.contains(&leaf.id) {
                panic!("MockTree: injected panic while downloading {}", leaf.id);
            }
            let fail_midway = match faults.failing_downloads.get_mut(&leaf.id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining = remaining.saturating_sub(1);
                    true
                },
                _ => false,
            };
            faults.active_downloads += 1;
            faults.peak_downloads = faults.peak_downloads.max(faults.active_downloads);
            let start = faults.tick();
            faults.windows.insert(leaf.id.clone(), (start, start));
            (fail_midway, faults.download_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        {
            let mut faults = self.faults.lock().await;
            faults.active_downloads -= 1;
            let end = faults.tick();
            if let Some(window) = faults.windows.get_mut(&leaf.id) {
                window.1 = end;
            }
        }
        let chunk_size = chunk_size.max(1);
        let mut items: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < content.len() {
            let end = (offset + chunk_size).min(content.len());
            items.push(Ok(content.slice(offset..end)));
            offset = end;
            if fail_midway {
                let reset = ErrorKind::Network(format!("injected connection reset for {}", leaf.id));
                items.push(Err(exn::Exn::from(reset)));
                break;
            }
        }
        if fail_midway && content.is_empty() {
            items.push(Err(exn::Exn::from(ErrorKind::Network(format!("injected connection reset for {}", leaf.id)))));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
