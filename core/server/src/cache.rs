use knowledge_base_schemas::CategoryNode;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedForest {
    built_at: Instant,
    forest: Vec<CategoryNode>,
}

/// Time-boxed copy of the last materialized category forest.
///
/// Handlers that change categories or articles must call `invalidate` while
/// they still hold the database lock, so a stale forest is never put back.
pub struct ForestCache {
    ttl: Duration,
    entry: RwLock<Option<CachedForest>>,
}

impl ForestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached forest, if one was stored within the TTL
    pub async fn get(&self) -> Option<Vec<CategoryNode>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|cached| cached.built_at.elapsed() < self.ttl)
            .map(|cached| cached.forest.clone())
    }

    pub async fn put(&self, forest: Vec<CategoryNode>) {
        if self.ttl.is_zero() {
            return;
        }

        *self.entry.write().await = Some(CachedForest {
            built_at: Instant::now(),
            forest,
        });
    }

    pub async fn invalidate(&self) {
        if self.entry.write().await.take().is_some() {
            debug!("Category forest cache invalidated");
        }
    }
}
