use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

// --- Enums ---

/// Closed set of resource categories tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    FoodBank,
    FoodPantry,
    SoupKitchen,
    MealProgram,
    Other,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::FoodBank => "food_bank",
            ResourceCategory::FoodPantry => "food_pantry",
            ResourceCategory::SoupKitchen => "soup_kitchen",
            ResourceCategory::MealProgram => "meal_program",
            ResourceCategory::Other => "other",
        }
    }

    /// All categories the discovery orchestrator queries for.
    pub fn all() -> [ResourceCategory; 4] {
        [
            ResourceCategory::FoodBank,
            ResourceCategory::FoodPantry,
            ResourceCategory::SoupKitchen,
            ResourceCategory::MealProgram,
        ]
    }
}

impl std::str::FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "food_bank" => Ok(ResourceCategory::FoodBank),
            "food_pantry" => Ok(ResourceCategory::FoodPantry),
            "soup_kitchen" => Ok(ResourceCategory::SoupKitchen),
            "meal_program" => Ok(ResourceCategory::MealProgram),
            "other" => Ok(ResourceCategory::Other),
            other => Err(format!("Unknown resource category: {other}")),
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Regions ---

/// A discovery scope. Zip searches are narrow (verified synchronously),
/// county searches are wide (persisted pending, verified by the worker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Zip(String),
    County { name: String, state: String },
}

impl Region {
    /// Stable key used for cache entries and resource region scoping.
    pub fn key(&self) -> String {
        match self {
            Region::Zip(zip) => format!("zip-{}", zip.trim().to_lowercase()),
            Region::County { name, state } => format!(
                "county-{}-{}",
                state.trim().to_lowercase(),
                name.trim().to_lowercase().replace(' ', "-")
            ),
        }
    }

    /// Wide searches defer verification to the enrichment worker.
    pub fn is_wide(&self) -> bool {
        matches!(self, Region::County { .. })
    }

    /// Human-readable region name for query phrasing.
    pub fn display_name(&self) -> String {
        match self {
            Region::Zip(zip) => zip.clone(),
            Region::County { name, state } => format!("{name} County, {state}"),
        }
    }
}

// --- Closure reasons ---

pub const PERMANENT_CLOSURE_REASON: &str = "Permanently closed";
pub const TEMPORARY_CLOSURE_REASON: &str = "Temporarily closed";

/// True when a failure reason marks the location as permanently closed.
/// Permanently closed records are terminal and never re-claimed.
pub fn is_permanent_closure(reason: Option<&str>) -> bool {
    reason
        .map(|r| r.to_lowercase().contains("permanently closed"))
        .unwrap_or(false)
}

pub fn is_temporary_closure(reason: Option<&str>) -> bool {
    reason
        .map(|r| r.to_lowercase().contains("temporarily closed"))
        .unwrap_or(false)
}

// --- Dedup ---

/// Normalized dedup key: lowercase(name) + "-" + lowercase(address).
/// Enforced only at insertion time — concurrent insert races may rarely
/// produce duplicates, which is an accepted tradeoff.
pub fn dedup_key(name: &str, address: &str) -> String {
    format!(
        "{}-{}",
        name.trim().to_lowercase(),
        address.trim().to_lowercase()
    )
}

// --- Resource ---

/// A candidate or confirmed location record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: ResourceCategory,
    pub location: Option<GeoPoint>,
    pub phone: Option<String>,
    pub hours: Option<String>,
    pub source_url: Option<String>,
    /// Stable identifier assigned by the external verifier, if any.
    pub external_id: Option<String>,
    pub verified: bool,
    pub verification_notes: String,
    pub needs_enrichment: bool,
    /// Doubles as the lease stamp for the enrichment worker.
    pub last_enrichment_attempt: Option<DateTime<Utc>>,
    pub enrichment_failure_count: u32,
    pub enrichment_failure_reason: Option<String>,
    pub exportable: bool,
    pub region_key: String,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Build an unverified resource from a discovery candidate.
    pub fn from_candidate(candidate: &Candidate, region_key: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: candidate.name.clone(),
            address: candidate.address.clone(),
            city: candidate.city.clone(),
            state: candidate.state.clone(),
            category: candidate.category,
            location: None,
            phone: candidate.phone.clone(),
            hours: candidate.hours.clone(),
            source_url: candidate.source_url.clone(),
            external_id: None,
            verified: false,
            verification_notes: String::new(),
            needs_enrichment: true,
            last_enrichment_attempt: None,
            enrichment_failure_count: 0,
            enrichment_failure_reason: None,
            exportable: true,
            region_key: region_key.to_string(),
            created_at: now,
        }
    }

    pub fn dedup_key(&self) -> String {
        dedup_key(&self.name, &self.address)
    }

    /// The lease predicate: eligible for an enrichment attempt right now.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: Duration, max_attempts: u32) -> bool {
        self.needs_enrichment
            && self.enrichment_failure_count < max_attempts
            && !is_permanent_closure(self.enrichment_failure_reason.as_deref())
            && self
                .last_enrichment_attempt
                .map(|t| t < now - lease)
                .unwrap_or(true)
    }

    /// Merge enriched fields from a confirmed verification: incoming
    /// non-empty values win, empty values fall back to what we had.
    /// Resets the failure counter and clears the failure reason.
    pub fn apply_enrichment(&mut self, verified: &Verified) {
        if let Some(addr) = verified
            .formatted_address
            .as_deref()
            .filter(|a| !a.is_empty())
        {
            self.address = addr.to_string();
        }
        if verified.location.is_some() {
            self.location = verified.location;
        }
        if let Some(phone) = verified.phone.as_deref().filter(|p| !p.is_empty()) {
            self.phone = Some(phone.to_string());
        }
        if let Some(hours) = verified.hours.as_deref().filter(|h| !h.is_empty()) {
            self.hours = Some(hours.to_string());
        }
        if let Some(ext) = verified.external_id.as_deref().filter(|e| !e.is_empty()) {
            self.external_id = Some(ext.to_string());
        }

        self.verified = true;
        self.needs_enrichment = false;
        self.enrichment_failure_count = 0;
        self.enrichment_failure_reason = None;
        self.verification_notes = format!("Verified as \"{}\"", verified.name);
    }
}

// --- Discovery candidates ---

/// A partial location record extracted from web search results,
/// not yet deduplicated, filtered, or verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: ResourceCategory,
    pub source_url: Option<String>,
    pub phone: Option<String>,
    pub hours: Option<String>,
}

impl Candidate {
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.name, &self.address)
    }
}

// --- Search cache ---

/// Per-region record of the most recent discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCacheEntry {
    pub region_key: String,
    pub searched_at: DateTime<Utc>,
    pub result_count: u32,
}

impl SearchCacheEntry {
    /// Within the TTL window. Freshness additionally requires at least one
    /// stored resource for the region — that half lives with the caller,
    /// which can see the resource store.
    pub fn is_within_ttl(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.searched_at > now - ttl
    }
}

// --- Verification interface ---

/// Input to the verifier adapter: the fields we know about a candidate.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: ResourceCategory,
}

impl VerifyRequest {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            name: resource.name.clone(),
            address: resource.address.clone(),
            city: resource.city.clone(),
            state: resource.state.clone(),
            category: resource.category,
        }
    }

    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            name: candidate.name.clone(),
            address: candidate.address.clone(),
            city: candidate.city.clone(),
            state: candidate.state.clone(),
            category: candidate.category,
        }
    }
}

/// Enriched fields returned on a confirmed verification.
#[derive(Debug, Clone, Default)]
pub struct Verified {
    /// The name the verifier found (may differ slightly from the query).
    pub name: String,
    pub formatted_address: Option<String>,
    pub location: Option<GeoPoint>,
    pub phone: Option<String>,
    pub hours: Option<String>,
    pub external_id: Option<String>,
}

/// Classified outcome of a verification call. The enrichment worker's
/// state machine branches on exactly these.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Confirmed(Verified),
    NotFound,
    PermanentlyClosed,
    TemporarilyClosed,
    /// The found place is a blocked place type (storage unit, ATM, ...).
    BlockedCategory(String),
    /// The found place's name doesn't match what we searched for.
    NameMismatch { found: String, ratio: f64 },
}

/// Errors from the verifier adapter, split so the worker can distinguish
/// a blocked pipeline (bad credentials) from an ordinary transient failure.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Verifier configuration error: {0}")]
    Configuration(String),

    #[error("Transient verification error: {0}")]
    Transient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_resource() -> Resource {
        Resource::from_candidate(
            &Candidate {
                name: "Community Pantry".to_string(),
                address: "123 Main St".to_string(),
                city: Some("Stillwater".to_string()),
                state: Some("MN".to_string()),
                category: ResourceCategory::FoodPantry,
                source_url: None,
                phone: None,
                hours: None,
            },
            "county-mn-washington",
            Utc::now(),
        )
    }

    #[test]
    fn dedup_key_is_case_insensitive() {
        assert_eq!(
            dedup_key("Community Pantry", "123 Main St"),
            dedup_key("community pantry", "123 main st"),
        );
    }

    #[test]
    fn fresh_record_is_claimable() {
        let r = pending_resource();
        assert!(r.is_claimable(Utc::now(), Duration::minutes(5), 3));
    }

    #[test]
    fn record_within_lease_window_is_not_claimable() {
        let now = Utc::now();
        let mut r = pending_resource();
        r.last_enrichment_attempt = Some(now - Duration::minutes(2));
        assert!(!r.is_claimable(now, Duration::minutes(5), 3));
        // Claimable again once the lease expires
        assert!(r.is_claimable(now + Duration::minutes(4), Duration::minutes(5), 3));
    }

    #[test]
    fn three_strikes_excludes_record() {
        let mut r = pending_resource();
        r.enrichment_failure_count = 3;
        r.enrichment_failure_reason = Some("Not found".to_string());
        assert!(!r.is_claimable(Utc::now(), Duration::minutes(5), 3));
    }

    #[test]
    fn permanent_closure_excludes_record_regardless_of_count() {
        let mut r = pending_resource();
        r.enrichment_failure_reason = Some(PERMANENT_CLOSURE_REASON.to_string());
        assert_eq!(r.enrichment_failure_count, 0);
        assert!(!r.is_claimable(Utc::now(), Duration::minutes(5), 3));
    }

    #[test]
    fn apply_enrichment_merges_non_empty_and_resets_failures() {
        let mut r = pending_resource();
        r.enrichment_failure_count = 2;
        r.enrichment_failure_reason = Some("Not found".to_string());
        r.phone = Some("651-555-0100".to_string());

        r.apply_enrichment(&Verified {
            name: "Community Food Pantry".to_string(),
            formatted_address: Some("123 Main St, Stillwater, MN 55082".to_string()),
            location: Some(GeoPoint { lat: 45.05, lng: -92.80 }),
            phone: None, // empty incoming — existing phone survives
            hours: Some("Mon-Fri 9-5".to_string()),
            external_id: Some("place-abc123".to_string()),
        });

        assert!(r.verified);
        assert!(!r.needs_enrichment);
        assert_eq!(r.enrichment_failure_count, 0);
        assert_eq!(r.enrichment_failure_reason, None);
        assert_eq!(r.phone.as_deref(), Some("651-555-0100"));
        assert_eq!(r.hours.as_deref(), Some("Mon-Fri 9-5"));
        assert_eq!(r.address, "123 Main St, Stillwater, MN 55082");
        assert_eq!(r.external_id.as_deref(), Some("place-abc123"));
    }

    #[test]
    fn region_keys_are_stable() {
        assert_eq!(Region::Zip("55407".to_string()).key(), "zip-55407");
        assert_eq!(
            Region::County {
                name: "Washington".to_string(),
                state: "MN".to_string()
            }
            .key(),
            "county-mn-washington"
        );
    }

    #[test]
    fn cache_entry_ttl_boundary() {
        let now = Utc::now();
        let fresh = SearchCacheEntry {
            region_key: "zip-55407".to_string(),
            searched_at: now - Duration::days(29),
            result_count: 4,
        };
        let stale = SearchCacheEntry {
            searched_at: now - Duration::days(31),
            ..fresh.clone()
        };
        assert!(fresh.is_within_ttl(now, Duration::days(30)));
        assert!(!stale.is_within_ttl(now, Duration::days(30)));
    }
}
