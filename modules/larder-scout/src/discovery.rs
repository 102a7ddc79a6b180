//! Discovery orchestrator. Runs a fixed battery of per-category web search
//! queries for a region, funnels the raw hits through dedup and the origin
//! and locality filters, and persists what survives.
//!
//! Narrow (zip) searches verify each surviving candidate synchronously and
//! drop the failures — small result sets, worth the latency for clean rows.
//! Wide (county) searches produce too many candidates to verify inline, so
//! those are persisted pending and left to the enrichment worker.
//!
//! A fresh cache entry short-circuits the whole run: freshness means an
//! entry inside the TTL *and* at least one stored resource for the region.
//! An entry with zero surviving resources proves nothing about the region.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use larder_common::{
    Candidate, Config, LarderError, Region, Resource, ResourceCategory, SearchCacheEntry,
    VerifyOutcome, VerifyRequest,
};
use larder_store::{ResourceStore, SearchCacheStore, StoreError};

use crate::locality;
use crate::source_filter;
use crate::traits::{DiscoveryProvider, Verifier};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Courtesy pause between successive search queries.
    pub query_delay: StdDuration,
    /// Courtesy pause between successive synchronous verification calls.
    pub verify_delay: StdDuration,
    pub cache_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            query_delay: StdDuration::from_millis(1000),
            verify_delay: StdDuration::from_millis(500),
            cache_ttl: Duration::days(30),
        }
    }
}

impl DiscoveryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            query_delay: StdDuration::from_millis(config.query_delay_ms),
            verify_delay: StdDuration::from_millis(config.verify_delay_ms),
            cache_ttl: Duration::days(config.cache_ttl_days),
        }
    }
}

/// What one discovery run did, for the log line and the CLI summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoveryStats {
    pub queries_run: usize,
    pub raw_candidates: usize,
    pub duplicates_skipped: usize,
    pub filtered_out: usize,
    pub already_known: usize,
    pub verified: usize,
    pub dropped_unverified: usize,
    pub persisted_pending: usize,
}

impl std::fmt::Display for DiscoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} queries, {} raw, {} dup, {} filtered, {} known, {} verified, {} dropped, {} pending",
            self.queries_run,
            self.raw_candidates,
            self.duplicates_skipped,
            self.filtered_out,
            self.already_known,
            self.verified,
            self.dropped_unverified,
            self.persisted_pending,
        )
    }
}

pub struct DiscoveryOutcome {
    /// Stored resources for the region, grouped by category.
    pub resources: HashMap<ResourceCategory, Vec<Resource>>,
    /// True when a fresh cache entry answered the run without searching.
    pub cached: bool,
    pub stats: DiscoveryStats,
}

impl DiscoveryOutcome {
    pub fn total(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

pub struct Discoverer {
    store: Arc<dyn ResourceStore>,
    cache: Arc<dyn SearchCacheStore>,
    provider: Arc<dyn DiscoveryProvider>,
    verifier: Arc<dyn Verifier>,
    config: DiscoveryConfig,
}

impl Discoverer {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<dyn SearchCacheStore>,
        provider: Arc<dyn DiscoveryProvider>,
        verifier: Arc<dyn Verifier>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            cache,
            provider,
            verifier,
            config,
        }
    }

    /// The query battery for a region: one phrasing per category, worded
    /// the way people actually list these services.
    pub fn build_queries(region: &Region) -> Vec<(ResourceCategory, String)> {
        let place = region.display_name();
        vec![
            (
                ResourceCategory::FoodBank,
                format!("food banks in {place}"),
            ),
            (
                ResourceCategory::FoodPantry,
                format!("food pantries near {place}"),
            ),
            (
                ResourceCategory::SoupKitchen,
                format!("soup kitchens in {place}"),
            ),
            (
                ResourceCategory::MealProgram,
                format!("free meal programs {place}"),
            ),
        ]
    }

    /// Run discovery for a region. Cache and store reads are load-bearing
    /// and propagate; individual query and insert failures are logged and
    /// skipped so one bad upstream response never sinks the run.
    pub async fn discover(&self, region: &Region) -> Result<DiscoveryOutcome, LarderError> {
        let region_key = region.key();
        let now = Utc::now();

        if let Some(entry) = self
            .cache
            .latest(&region_key)
            .await
            .map_err(store_err)?
            .filter(|e| e.is_within_ttl(now, self.config.cache_ttl))
        {
            let existing = self.store.for_region(&region_key).await.map_err(store_err)?;
            if !existing.is_empty() {
                info!(
                    region = %region_key,
                    resources = existing.len(),
                    searched_at = %entry.searched_at,
                    "Discovery served from cache"
                );
                return Ok(DiscoveryOutcome {
                    resources: group_by_category(existing),
                    cached: true,
                    stats: DiscoveryStats::default(),
                });
            }
        }

        let mut stats = DiscoveryStats::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        for (i, (category, query)) in Self::build_queries(region).into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.query_delay).await;
            }
            stats.queries_run += 1;

            let hits = match self.provider.search(&query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = %query, error = %e, "Discovery query failed, continuing");
                    continue;
                }
            };
            stats.raw_candidates += hits.len();

            for mut candidate in hits {
                // The query targeted this category; the hit keeps it.
                candidate.category = category;

                if !seen.insert(candidate.dedup_key()) {
                    stats.duplicates_skipped += 1;
                    continue;
                }
                if !source_filter::allowed(candidate.source_url.as_deref()) {
                    stats.filtered_out += 1;
                    continue;
                }
                if let Region::County { name, .. } = region {
                    if !locality::in_scope(name, candidate.city.as_deref()) {
                        stats.filtered_out += 1;
                        continue;
                    }
                }
                candidates.push(candidate);
            }
        }

        let keys: Vec<String> = candidates.iter().map(Candidate::dedup_key).collect();
        let known = self
            .store
            .existing_dedup_keys(&keys)
            .await
            .map_err(store_err)?;

        let mut stored: Vec<Resource> = Vec::new();
        for candidate in candidates {
            if known.contains(&candidate.dedup_key()) {
                stats.already_known += 1;
                continue;
            }

            let resource = if region.is_wide() {
                stats.persisted_pending += 1;
                Resource::from_candidate(&candidate, &region_key, Utc::now())
            } else {
                match self.verify_inline(&candidate, &mut stats).await {
                    Some(mut resource) => {
                        resource.region_key = region_key.clone();
                        resource
                    }
                    None => continue,
                }
            };

            if let Err(e) = self.store.insert(&resource).await {
                warn!(resource = %resource.name, error = %e, "Failed to store resource");
                continue;
            }
            stored.push(resource);
        }

        let entry = SearchCacheEntry {
            region_key: region_key.clone(),
            searched_at: Utc::now(),
            result_count: stored.len() as u32,
        };
        if let Err(e) = self.cache.record(&entry).await {
            warn!(region = %region_key, error = %e, "Failed to record search cache entry");
        }

        info!(region = %region_key, stats = %stats, "Discovery complete");
        Ok(DiscoveryOutcome {
            resources: group_by_category(stored),
            cached: false,
            stats,
        })
    }

    /// Verify one candidate during a narrow run. Anything but a confirmed
    /// outcome drops the candidate; zip result sets are small enough that
    /// re-discovery is cheaper than carrying unverifiable rows.
    async fn verify_inline(
        &self,
        candidate: &Candidate,
        stats: &mut DiscoveryStats,
    ) -> Option<Resource> {
        if stats.verified + stats.dropped_unverified > 0 {
            tokio::time::sleep(self.config.verify_delay).await;
        }

        let request = VerifyRequest::from_candidate(candidate);
        match self.verifier.verify(&request).await {
            Ok(VerifyOutcome::Confirmed(verified)) => {
                stats.verified += 1;
                let mut resource = Resource::from_candidate(candidate, "", Utc::now());
                resource.apply_enrichment(&verified);
                Some(resource)
            }
            Ok(outcome) => {
                stats.dropped_unverified += 1;
                info!(candidate = %candidate.name, ?outcome, "Dropped unverified candidate");
                None
            }
            Err(e) => {
                stats.dropped_unverified += 1;
                warn!(candidate = %candidate.name, error = %e, "Inline verification failed");
                None
            }
        }
    }
}

fn store_err(e: StoreError) -> LarderError {
    LarderError::Database(e.to_string())
}

fn group_by_category(resources: Vec<Resource>) -> HashMap<ResourceCategory, Vec<Resource>> {
    let mut grouped: HashMap<ResourceCategory, Vec<Resource>> = HashMap::new();
    for resource in resources {
        grouped.entry(resource.category).or_default().push(resource);
    }
    grouped
}

// ---------------------------------------------------------------------------
// Web search adapter
// ---------------------------------------------------------------------------

/// DiscoveryProvider backed by the places web search API.
pub struct WebSearchDiscovery {
    client: websearch_client::SearchClient,
}

impl WebSearchDiscovery {
    pub fn new(api_key: String) -> Self {
        Self {
            client: websearch_client::SearchClient::new(api_key),
        }
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for WebSearchDiscovery {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<Candidate>> {
        let hits = self.client.places(query).await?;
        Ok(hits.into_iter().filter_map(hit_to_candidate).collect())
    }
}

/// Hits without a usable title and address can never be deduped or
/// verified, so they are dropped at the boundary. The category is stamped
/// later by the orchestrator from the query that produced the hit.
fn hit_to_candidate(hit: websearch_client::PlaceHit) -> Option<Candidate> {
    let name = hit.title.trim();
    let address = hit.address.as_deref().unwrap_or("").trim().to_string();
    if name.is_empty() || address.is_empty() {
        return None;
    }

    let (city, state) = split_address(&address);
    Some(Candidate {
        name: name.to_string(),
        address,
        city,
        state,
        category: ResourceCategory::Other,
        source_url: hit.website,
        phone: hit.phone_number,
        hours: hit.opening_hours,
    })
}

/// Best-effort city/state extraction from "street, city, ST zip" addresses.
fn split_address(address: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return (None, None);
    }

    let city = parts[parts.len() - 2];
    let state = parts[parts.len() - 1]
        .split_whitespace()
        .next()
        .filter(|s| s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()));

    (
        Some(city.to_string()).filter(|c| !c.is_empty()),
        state.map(str::to_uppercase),
    )
}
