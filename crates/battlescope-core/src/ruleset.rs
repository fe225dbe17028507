//! Process-wide `Ruleset` cache.
//!
//! The ruleset is read once at the start of each clustering batch and never
//! re-read mid-batch, so every battle candidate in that batch is filtered
//! against the same snapshot even if an admin updates the ruleset
//! concurrently. A `RwLock<Arc<Ruleset>>` gives cheap concurrent reads
//! (`snapshot()`) while `refresh()` swaps in a freshly loaded value without
//! blocking readers already holding a snapshot.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::ports::RulesetStore;
use crate::types::Ruleset;

pub struct RulesetCache {
    current: RwLock<Arc<Ruleset>>,
}

impl RulesetCache {
    pub fn new(initial: Ruleset) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Load the current value from the store and cache it. Call once at
    /// startup and again whenever an admin mutates the ruleset.
    pub async fn refresh(&self, store: &dyn RulesetStore) -> Result<Arc<Ruleset>> {
        let fresh = Arc::new(store.get().await?);
        *self.current.write().await = fresh.clone();
        Ok(fresh)
    }

    /// The snapshot in effect right now. Stable for the caller's lifetime of
    /// use even if `refresh` runs concurrently elsewhere — a clustering batch
    /// should call this once up front and hold the returned `Arc` for the
    /// whole batch.
    pub async fn snapshot(&self) -> Arc<Ruleset> {
        self.current.read().await.clone()
    }
}
