//! Local staging area for in-flight downloads.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ferry_source::SourceNode;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Directory every leaf is downloaded into before being uploaded.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Create the staging directory (and its parents) if needed.
    pub async fn prepare(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::Staging(dir.clone()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{leafId}_{leafName}`. Leaf ids are unique within a source, so
    /// concurrent downloads never share a staging file. Path separators in
    /// either part are replaced so the file always lands directly in `dir`.
    pub fn path_for(&self, leaf: &SourceNode) -> PathBuf {
        self.dir.join(format!("{}_{}", flatten(leaf.id.as_str()), flatten(&leaf.name)))
    }
}

fn flatten(part: &str) -> String {
    part.replace(['/', '\\'], "_")
}

/// Delete a staging file, treating "already gone" as success.
pub(crate) async fn remove(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != IoErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Owns one staging path for the lifetime of a task.
///
/// [`discard()`](Self::discard) removes the file at the end of a task. If the
/// task never gets there (it panicked, or was dropped mid-flight), `Drop`
/// removes it synchronously instead.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    discarded: bool,
}

impl StagingFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, discarded: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal; a failure is logged and otherwise ignored.
    pub async fn discard(mut self) {
        if let Err(e) = remove(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not remove staging file");
        }
        self.discarded = true;
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != IoErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not remove staging file");
            },
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_creates_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::prepare(tmp.path().join("a/b")).await.unwrap();
        assert!(area.dir().is_dir());
    }

    #[tokio::test]
    async fn test_path_for_is_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::prepare(tmp.path()).await.unwrap();
        let leaf = SourceNode::leaf("200/running/vid1.mp4", "vid1.mp4", None, None);
        assert_eq!(area.path_for(&leaf), tmp.path().join("200_running_vid1.mp4_vid1.mp4"));
        let leaf = SourceNode::leaf("1aBc", "vid1.mp4", None, None);
        assert_eq!(area.path_for(&leaf), tmp.path().join("1aBc_vid1.mp4"));
    }

    #[tokio::test]
    async fn test_discard_and_drop_remove_file() {
        let tmp = tempfile::tempdir().unwrap();
        let discarded = tmp.path().join("one");
        let dropped = tmp.path().join("two");
        std::fs::write(&discarded, b"x").unwrap();
        std::fs::write(&dropped, b"x").unwrap();

        StagingFile::new(discarded.clone()).discard().await;
        drop(StagingFile::new(dropped.clone()));
        assert!(!discarded.exists());
        assert!(!dropped.exists());

        // Nothing to remove is fine.
        StagingFile::new(tmp.path().join("never-created")).discard().await;
    }
}
