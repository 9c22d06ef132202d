//! Flattening of an extracted local dataset.
//!
//! Moves `{from}/{resolution}/{label}/{file}` to `{to}/{label}/{file}`, so a
//! dataset extracted from an archive can be synced to an object store as is.

use crate::enumerate::{Extensions, SourceEnumerator};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ferry_source::{SourceNode, tree::LocalTree};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestructureSummary {
    pub moved: usize,
    /// Entries of label folders that are not an allowed file.
    pub skipped: usize,
}

/// Move every allowed file under `from` into its label folder under `to`.
///
/// A file whose name is already taken in its label folder gets a `_1`, `_2`,
/// ... suffix before its extension. Listing failures are fatal: a half
/// restructured dataset is easy to resume, a silently skipped folder is not.
pub async fn restructure(from: &Path, to: &Path, extensions: &Extensions) -> Result<RestructureSummary> {
    let tree = LocalTree::new("restructure", from).or_raise(|| ErrorKind::Enumeration(from.display().to_string()))?;
    let enumerator = SourceEnumerator::new(Arc::new(tree.clone()), extensions.clone());
    fs::create_dir_all(to).await.or_raise(|| ErrorKind::Restructure(to.to_path_buf()))?;
    let mut summary = RestructureSummary::default();

    for resolution in enumerator.resolutions().await? {
        tracing::info!(resolution = %resolution.name, "Restructuring resolution");
        for label in enumerator.labels(&resolution).await? {
            let scan = enumerator.scan_leaves(&label).await?;
            summary.skipped += scan.rejected;
            if scan.accepted.is_empty() {
                continue;
            }
            let label_dir = to.join(&label.name);
            fs::create_dir_all(&label_dir).await.or_raise(|| ErrorKind::Restructure(label_dir.clone()))?;
            for leaf in scan.accepted {
                let source = tree
                    .absolute_path(&leaf.id)
                    .or_raise(|| ErrorKind::Restructure(PathBuf::from(leaf.id.as_str())))?;
                let target = unique_path(&label_dir, &leaf).await;
                move_file(&source, &target).await?;
                tracing::debug!(from = %source.display(), to = %target.display(), "Moved");
                summary.moved += 1;
            }
        }
    }

    tracing::info!(moved = summary.moved, skipped = summary.skipped, "Restructure finished");
    Ok(summary)
}

/// First free path among `name`, `stem_1.ext`, `stem_2.ext`, ...
async fn unique_path(dir: &Path, leaf: &SourceNode) -> PathBuf {
    let candidate = dir.join(&leaf.name);
    if !fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }
    let (stem, extension) = match leaf.extension() {
        Some(ext) => (&leaf.name[..leaf.name.len() - ext.len() - 1], format!(".{ext}")),
        None => (leaf.name.as_str(), String::new()),
    };
    let mut counter = 1usize;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{extension}"));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to copy-then-delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == IoErrorKind::CrossesDevices => {},
        Err(e) => return Err(exn::Exn::from(e).raise(ErrorKind::Restructure(from.to_path_buf()))),
    }
    fs::copy(from, to).await.or_raise(|| ErrorKind::Restructure(from.to_path_buf()))?;
    fs::remove_file(from).await.or_raise(|| ErrorKind::Restructure(from.to_path_buf()))?;
    Ok(())
}
