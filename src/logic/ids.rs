use std::sync::Arc;

use crate::error::{ProdhubError, ProdhubResult};
use crate::model::{Id, REPO_ID_COUNTER};
use crate::store::traits::CounterStore;

/// Strictly increasing numeric IDs per counter key. Uniqueness rests
/// entirely on the counter store's atomic increment; nothing is cached or
/// locked here.
#[derive(Clone)]
pub struct IdGenerator {
    counters: Arc<dyn CounterStore>,
}

impl IdGenerator {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    pub async fn next_id(&self, key: &str) -> ProdhubResult<i64> {
        self.counters
            .increment(key)
            .await
            .map_err(|e| ProdhubError::CounterUnavailable(e.to_string()))
    }

    /// Next repository ID, rendered as the numeric string stored on documents
    pub async fn next_repository_id(&self) -> ProdhubResult<Id> {
        Ok(self.next_id(REPO_ID_COUNTER).await?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::memory::{FailPoint, MemoryContentStore};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_ids_are_scoped_by_key() {
        let ids = IdGenerator::new(Arc::new(MemoryContentStore::new()));
        assert_eq!(ids.next_id("a").await.unwrap(), 1);
        assert_eq!(ids.next_id("a").await.unwrap(), 2);
        assert_eq!(ids.next_id("b").await.unwrap(), 1);
        assert_eq!(ids.next_repository_id().await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_share_an_id() {
        let ids = IdGenerator::new(Arc::new(MemoryContentStore::new()));
        let calls = 100;

        let mut handles = Vec::new();
        for _ in 0..calls {
            let ids = ids.clone();
            handles.push(tokio::spawn(async move { ids.next_id("repoId").await.unwrap() }));
        }

        let mut seen = HashSet::new();
        let mut max = 0;
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(seen.insert(id), "duplicate id {}", id);
            max = max.max(id);
        }
        assert_eq!(max, calls);
    }

    #[tokio::test]
    async fn test_unreachable_counter_store() {
        let store = Arc::new(MemoryContentStore::new());
        store.fail(FailPoint::Increment, StoreError::Unavailable("no route".to_string()));
        let ids = IdGenerator::new(store);

        let err = ids.next_repository_id().await.unwrap_err();
        assert!(matches!(err, ProdhubError::CounterUnavailable(_)));
    }
}
