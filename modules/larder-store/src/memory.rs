//! In-memory store. Backs the pipeline's tests and local development runs;
//! implements the same lease semantics as the Postgres store, including the
//! single-critical-section `claim_batch`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use larder_common::{is_permanent_closure, Resource, SearchCacheEntry};

use crate::{EnrichmentCounts, ResourceStore, SearchCacheStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<Uuid, Resource>>,
    cache: RwLock<Vec<SearchCacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored resource, unordered. Test helper.
    pub fn all(&self) -> Vec<Resource> {
        self.resources.read().unwrap().values().cloned().collect()
    }

    /// Synchronous insert for test setup.
    pub fn seed(&self, resource: &Resource) {
        self.resources
            .write()
            .unwrap()
            .insert(resource.id, resource.clone());
    }

    /// Synchronous fetch for test assertions. Panics if the id is unknown.
    pub fn get_sync(&self, id: Uuid) -> Resource {
        self.resources
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no resource with id {id}"))
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError> {
        self.resources
            .write()
            .unwrap()
            .insert(resource.id, resource.clone());
        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), StoreError> {
        self.resources
            .write()
            .unwrap()
            .insert(resource.id, resource.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>, StoreError> {
        Ok(self.resources.read().unwrap().get(&id).cloned())
    }

    async fn for_region(&self, region_key: &str) -> Result<Vec<Resource>, StoreError> {
        let mut out: Vec<Resource> = self
            .resources
            .read()
            .unwrap()
            .values()
            .filter(|r| r.region_key == region_key)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn existing_dedup_keys(
        &self,
        keys: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let wanted: HashSet<&str> = keys.iter().map(|k| k.as_str()).collect();
        Ok(self
            .resources
            .read()
            .unwrap()
            .values()
            .map(|r| r.dedup_key())
            .filter(|k| wanted.contains(k.as_str()))
            .collect())
    }

    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut resources = self.resources.write().unwrap();

        let mut claimable_ids: Vec<(Uuid, DateTime<Utc>)> = resources
            .values()
            .filter(|r| r.is_claimable(now, lease, max_attempts))
            .map(|r| (r.id, r.created_at))
            .collect();
        // Newest-created-first is the explicit tie-break policy
        claimable_ids.sort_by(|a, b| b.1.cmp(&a.1));

        let mut claimed = Vec::new();
        for (id, _) in claimable_ids.into_iter().take(limit) {
            let record = resources.get_mut(&id).expect("id from same lock scope");
            record.last_enrichment_attempt = Some(now);
            claimed.push(record.clone());
        }
        Ok(claimed)
    }

    async fn enrichment_counts(
        &self,
        max_attempts: u32,
    ) -> Result<EnrichmentCounts, StoreError> {
        let mut counts = EnrichmentCounts::default();
        for r in self.resources.read().unwrap().values() {
            if !r.needs_enrichment {
                continue;
            }
            let closed = is_permanent_closure(r.enrichment_failure_reason.as_deref());
            if closed || r.enrichment_failure_count >= max_attempts {
                counts.permanently_failed += 1;
            } else if r.enrichment_failure_count > 0 {
                counts.retryable += 1;
            } else {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SearchCacheStore for MemoryStore {
    async fn latest(&self, region_key: &str) -> Result<Option<SearchCacheEntry>, StoreError> {
        Ok(self
            .cache
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.region_key == region_key)
            .max_by_key(|e| e.searched_at)
            .cloned())
    }

    async fn record(&self, entry: &SearchCacheEntry) -> Result<(), StoreError> {
        self.cache.write().unwrap().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_common::{Candidate, ResourceCategory};

    fn candidate(name: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            address: "123 Main St".to_string(),
            city: None,
            state: None,
            category: ResourceCategory::FoodPantry,
            source_url: None,
            phone: None,
            hours: None,
        }
    }

    #[tokio::test]
    async fn claim_batch_stamps_leases_and_orders_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let older = Resource::from_candidate(&candidate("Older Pantry"), "zip-1", now - Duration::hours(2));
        let newer = Resource::from_candidate(&candidate("Newer Pantry"), "zip-1", now - Duration::hours(1));
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let claimed = store
            .claim_batch(now, Duration::minutes(5), 3, 1)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].name, "Newer Pantry");
        assert_eq!(claimed[0].last_enrichment_attempt, Some(now));

        // The stored copy carries the stamp too
        let stored = store.get(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(stored.last_enrichment_attempt, Some(now));
    }

    #[tokio::test]
    async fn two_claim_cycles_within_lease_never_overlap() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..4 {
            let r = Resource::from_candidate(
                &candidate(&format!("Pantry {i}")),
                "zip-1",
                now - Duration::minutes(i),
            );
            store.insert(&r).await.unwrap();
        }

        let first = store.claim_batch(now, Duration::minutes(5), 3, 2).await.unwrap();
        let second = store
            .claim_batch(now + Duration::seconds(30), Duration::minutes(5), 3, 4)
            .await
            .unwrap();

        let first_ids: HashSet<Uuid> = first.iter().map(|r| r.id).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|r| !first_ids.contains(&r.id)));
    }

    #[tokio::test]
    async fn existing_dedup_keys_matches_normalized() {
        let store = MemoryStore::new();
        let r = Resource::from_candidate(&candidate("Community Pantry"), "zip-1", Utc::now());
        store.insert(&r).await.unwrap();

        let hit = larder_common::dedup_key("community pantry", "123 MAIN ST");
        let miss = larder_common::dedup_key("other pantry", "9 Elm St");
        let found = store
            .existing_dedup_keys(&[hit.clone(), miss])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains(&hit));
    }

    #[tokio::test]
    async fn counts_partition_by_failure_state() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let pending = Resource::from_candidate(&candidate("Pending"), "zip-1", now);
        let mut retrying = Resource::from_candidate(&candidate("Retrying"), "zip-1", now);
        retrying.enrichment_failure_count = 2;
        retrying.enrichment_failure_reason = Some("Not found".to_string());
        let mut failed = Resource::from_candidate(&candidate("Failed"), "zip-1", now);
        failed.enrichment_failure_count = 3;
        let mut closed = Resource::from_candidate(&candidate("Closed"), "zip-1", now);
        closed.enrichment_failure_reason =
            Some(larder_common::PERMANENT_CLOSURE_REASON.to_string());
        let mut done = Resource::from_candidate(&candidate("Done"), "zip-1", now);
        done.needs_enrichment = false;

        for r in [&pending, &retrying, &failed, &closed, &done] {
            store.insert(r).await.unwrap();
        }

        let counts = store.enrichment_counts(3).await.unwrap();
        assert_eq!(
            counts,
            EnrichmentCounts {
                pending: 1,
                retryable: 1,
                permanently_failed: 2,
            }
        );
    }

    #[tokio::test]
    async fn latest_cache_entry_wins() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .record(&SearchCacheEntry {
                region_key: "zip-55407".to_string(),
                searched_at: now - Duration::days(40),
                result_count: 2,
            })
            .await
            .unwrap();
        store
            .record(&SearchCacheEntry {
                region_key: "zip-55407".to_string(),
                searched_at: now - Duration::days(3),
                result_count: 6,
            })
            .await
            .unwrap();

        let latest = store.latest("zip-55407").await.unwrap().unwrap();
        assert_eq!(latest.result_count, 6);
        assert!(store.latest("zip-00000").await.unwrap().is_none());
    }
}
