use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub type Artifacts = HashMap<String, String>;

/// Latest published artifacts, shared by the refresh task (single writer) and
/// request handlers (many readers).
///
/// The map behind the lock is immutable once published: writers build a new
/// map and swap the `Arc`, so a reader holding a snapshot never sees a later
/// batch bleed in.
pub struct PublishedCache {
    current: RwLock<Arc<Artifacts>>,
}

impl PublishedCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Value for `key`, or an empty string if nothing was published under it.
    pub fn read(&self, key: &str) -> String {
        self.current.read().get(key).cloned().unwrap_or_default()
    }

    /// Consistent view of every key from one publish batch.
    pub fn snapshot(&self) -> Arc<Artifacts> {
        self.current.read().clone()
    }

    #[allow(dead_code)]
    pub fn publish(&self, key: impl Into<String>, value: impl Into<String>) {
        self.publish_batch([(key.into(), value.into())]);
    }

    /// Makes all entries visible together. Keys not in the batch keep their
    /// previous values.
    #[allow(dead_code)]
    pub fn publish_batch<I>(&self, batch: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut current = self.current.write();
        let mut next = Artifacts::clone(&current);
        next.extend(batch);
        *current = Arc::new(next);
    }

    /// Swaps in `artifacts` as the complete published set. Keys absent from it
    /// disappear in the same step.
    pub fn replace_all<I>(&self, artifacts: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let next: Artifacts = artifacts.into_iter().collect();
        *self.current.write() = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }
}

impl Default for PublishedCache {
    fn default() -> Self {
        Self::new()
    }
}
