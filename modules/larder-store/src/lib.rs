//! Storage traits for the resource pipeline, with a Postgres implementation
//! for production and an in-memory implementation for tests and local runs.
//!
//! `claim_batch` is deliberately part of the store contract: selecting
//! claimable records and stamping their leases must happen in one critical
//! section, before any of them is dispatched. That ordering is the only
//! thing preventing two overlapping poll cycles from double-claiming a
//! record inside the lease window.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use larder_common::{Resource, SearchCacheEntry};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Monitoring reads consumed by the status surface. Pure observability —
/// nothing in the pipeline branches on these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentCounts {
    /// Pending first attempt (no failures yet).
    pub pending: u64,
    /// Failed at least once, still under the attempt budget.
    pub retryable: u64,
    /// Exhausted attempts or permanently closed.
    pub permanently_failed: u64,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn update(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Resource>, StoreError>;

    /// All resources for a region key, newest first.
    async fn for_region(&self, region_key: &str) -> Result<Vec<Resource>, StoreError>;

    /// Which of the given dedup keys already exist in the store.
    async fn existing_dedup_keys(
        &self,
        keys: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Select up to `limit` claimable records (newest-created-first) and
    /// stamp `last_enrichment_attempt = now` on every one of them before
    /// returning. Returned records carry the fresh stamp.
    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Resource>, StoreError>;

    async fn enrichment_counts(&self, max_attempts: u32)
        -> Result<EnrichmentCounts, StoreError>;
}

#[async_trait]
pub trait SearchCacheStore: Send + Sync {
    /// Most recent cache entry for a region, if any.
    async fn latest(&self, region_key: &str) -> Result<Option<SearchCacheEntry>, StoreError>;

    async fn record(&self, entry: &SearchCacheEntry) -> Result<(), StoreError>;
}
