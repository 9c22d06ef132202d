//! Destination keys and per-run key ownership.

use derive_more::Display;
use ferry_source::NodeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::Mutex;

/// Flat object key a leaf is uploaded to: `{base}/{label}/{name}`.
///
/// The label and leaf names are used verbatim: case is preserved and nothing
/// is escaped, so the same label and name always produce the same key.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey(String);

impl DestinationKey {
    pub fn new(base_prefix: &str, label: &str, name: &str) -> Self {
        Self(format!("{base_prefix}/{label}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DestinationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Records which leaf claimed each destination key during one run.
///
/// Leaves from different resolution folders can share a label and a name,
/// and therefore a key. The first leaf to claim a key owns it; later leaves
/// are skipped instead of overwriting it.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    claims: Mutex<HashMap<DestinationKey, NodeId>>,
}

impl KeyRegistry {
    /// Claim `key` for `leaf`. Returns the current owner if another leaf
    /// claimed it first. Claiming a key twice for the same leaf succeeds.
    pub async fn claim(&self, key: &DestinationKey, leaf: &NodeId) -> Result<(), NodeId> {
        match self.claims.lock().await.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(leaf.clone());
                Ok(())
            },
            Entry::Occupied(entry) if entry.get() == leaf => Ok(()),
            Entry::Occupied(entry) => Err(entry.get().clone()),
        }
    }

    pub async fn len(&self) -> usize {
        self.claims.lock().await.len()
    }
}
