//! Postgres store. Plain runtime-checked queries; the lease stamp in
//! `claim_batch` rides a single UPDATE over a `FOR UPDATE SKIP LOCKED`
//! subselect so concurrent workers cannot claim the same rows.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use larder_common::{GeoPoint, Resource, ResourceCategory, SearchCacheEntry};

use crate::{EnrichmentCounts, ResourceStore, SearchCacheStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run idempotent schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running schema migrations...");

        let statements = [
            "CREATE TABLE IF NOT EXISTS resources (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                city TEXT,
                state TEXT,
                category TEXT NOT NULL,
                lat DOUBLE PRECISION,
                lng DOUBLE PRECISION,
                phone TEXT,
                hours TEXT,
                source_url TEXT,
                external_id TEXT,
                verified BOOLEAN NOT NULL DEFAULT FALSE,
                verification_notes TEXT NOT NULL DEFAULT '',
                needs_enrichment BOOLEAN NOT NULL DEFAULT TRUE,
                last_enrichment_attempt TIMESTAMPTZ,
                enrichment_failure_count INTEGER NOT NULL DEFAULT 0,
                enrichment_failure_reason TEXT,
                exportable BOOLEAN NOT NULL DEFAULT TRUE,
                region_key TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_resources_region
                ON resources (region_key)",
            "CREATE INDEX IF NOT EXISTS idx_resources_pending
                ON resources (created_at DESC)
                WHERE needs_enrichment",
            "CREATE TABLE IF NOT EXISTS search_cache (
                region_key TEXT NOT NULL,
                searched_at TIMESTAMPTZ NOT NULL,
                result_count INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_search_cache_region
                ON search_cache (region_key, searched_at DESC)",
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Schema migrations complete");
        Ok(())
    }
}

fn row_to_resource(row: &PgRow) -> Result<Resource, StoreError> {
    let category_raw: String = row.try_get("category")?;
    let category: ResourceCategory = category_raw
        .parse()
        .map_err(StoreError::Corrupt)?;

    let lat: Option<f64> = row.try_get("lat")?;
    let lng: Option<f64> = row.try_get("lng")?;
    let location = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    let failure_count: i32 = row.try_get("enrichment_failure_count")?;

    Ok(Resource {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        category,
        location,
        phone: row.try_get("phone")?,
        hours: row.try_get("hours")?,
        source_url: row.try_get("source_url")?,
        external_id: row.try_get("external_id")?,
        verified: row.try_get("verified")?,
        verification_notes: row.try_get("verification_notes")?,
        needs_enrichment: row.try_get("needs_enrichment")?,
        last_enrichment_attempt: row.try_get("last_enrichment_attempt")?,
        enrichment_failure_count: failure_count.max(0) as u32,
        enrichment_failure_reason: row.try_get("enrichment_failure_reason")?,
        exportable: row.try_get("exportable")?,
        region_key: row.try_get("region_key")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn insert(&self, resource: &Resource) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO resources (
                id, name, address, city, state, category, lat, lng,
                phone, hours, source_url, external_id, verified,
                verification_notes, needs_enrichment, last_enrichment_attempt,
                enrichment_failure_count, enrichment_failure_reason,
                exportable, region_key, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21
            )",
        )
        .bind(resource.id)
        .bind(&resource.name)
        .bind(&resource.address)
        .bind(&resource.city)
        .bind(&resource.state)
        .bind(resource.category.as_str())
        .bind(resource.location.map(|l| l.lat))
        .bind(resource.location.map(|l| l.lng))
        .bind(&resource.phone)
        .bind(&resource.hours)
        .bind(&resource.source_url)
        .bind(&resource.external_id)
        .bind(resource.verified)
        .bind(&resource.verification_notes)
        .bind(resource.needs_enrichment)
        .bind(resource.last_enrichment_attempt)
        .bind(resource.enrichment_failure_count as i32)
        .bind(&resource.enrichment_failure_reason)
        .bind(resource.exportable)
        .bind(&resource.region_key)
        .bind(resource.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE resources SET
                name = $2, address = $3, city = $4, state = $5, category = $6,
                lat = $7, lng = $8, phone = $9, hours = $10, source_url = $11,
                external_id = $12, verified = $13, verification_notes = $14,
                needs_enrichment = $15, last_enrichment_attempt = $16,
                enrichment_failure_count = $17, enrichment_failure_reason = $18,
                exportable = $19, region_key = $20
             WHERE id = $1",
        )
        .bind(resource.id)
        .bind(&resource.name)
        .bind(&resource.address)
        .bind(&resource.city)
        .bind(&resource.state)
        .bind(resource.category.as_str())
        .bind(resource.location.map(|l| l.lat))
        .bind(resource.location.map(|l| l.lng))
        .bind(&resource.phone)
        .bind(&resource.hours)
        .bind(&resource.source_url)
        .bind(&resource.external_id)
        .bind(resource.verified)
        .bind(&resource.verification_notes)
        .bind(resource.needs_enrichment)
        .bind(resource.last_enrichment_attempt)
        .bind(resource.enrichment_failure_count as i32)
        .bind(&resource.enrichment_failure_reason)
        .bind(resource.exportable)
        .bind(&resource.region_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query("SELECT * FROM resources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_resource).transpose()
    }

    async fn for_region(&self, region_key: &str) -> Result<Vec<Resource>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM resources WHERE region_key = $1 ORDER BY created_at DESC",
        )
        .bind(region_key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_resource).collect()
    }

    async fn existing_dedup_keys(
        &self,
        keys: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT lower(trim(name)) || '-' || lower(trim(address)) AS dedup_key
             FROM resources
             WHERE lower(trim(name)) || '-' || lower(trim(address)) = ANY($1)",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("dedup_key").map_err(StoreError::from))
            .collect()
    }

    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Resource>, StoreError> {
        let lease_cutoff = now - lease;
        let rows = sqlx::query(
            "UPDATE resources SET last_enrichment_attempt = $1
             WHERE id IN (
                 SELECT id FROM resources
                 WHERE needs_enrichment = TRUE
                   AND enrichment_failure_count < $2
                   AND COALESCE(enrichment_failure_reason, '')
                       NOT ILIKE '%permanently closed%'
                   AND (last_enrichment_attempt IS NULL
                        OR last_enrichment_attempt < $3)
                 ORDER BY created_at DESC
                 LIMIT $4
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(now)
        .bind(max_attempts as i32)
        .bind(lease_cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed: Vec<Resource> = rows
            .iter()
            .map(row_to_resource)
            .collect::<Result<_, _>>()?;
        // RETURNING does not guarantee order — re-apply the tie-break policy
        claimed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(claimed)
    }

    async fn enrichment_counts(
        &self,
        max_attempts: u32,
    ) -> Result<EnrichmentCounts, StoreError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE NOT terminal AND failures = 0) AS pending,
                COUNT(*) FILTER (WHERE NOT terminal AND failures > 0) AS retryable,
                COUNT(*) FILTER (WHERE terminal) AS permanently_failed
             FROM (
                 SELECT enrichment_failure_count AS failures,
                        (enrichment_failure_count >= $1
                         OR COALESCE(enrichment_failure_reason, '')
                            ILIKE '%permanently closed%') AS terminal
                 FROM resources
                 WHERE needs_enrichment = TRUE
             ) pending_set",
        )
        .bind(max_attempts as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(EnrichmentCounts {
            pending: row.try_get::<i64, _>("pending")?.max(0) as u64,
            retryable: row.try_get::<i64, _>("retryable")?.max(0) as u64,
            permanently_failed: row.try_get::<i64, _>("permanently_failed")?.max(0) as u64,
        })
    }
}

#[async_trait]
impl SearchCacheStore for PgStore {
    async fn latest(&self, region_key: &str) -> Result<Option<SearchCacheEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT region_key, searched_at, result_count
             FROM search_cache
             WHERE region_key = $1
             ORDER BY searched_at DESC
             LIMIT 1",
        )
        .bind(region_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(SearchCacheEntry {
                region_key: row.try_get("region_key")?,
                searched_at: row.try_get("searched_at")?,
                result_count: row.try_get::<i32, _>("result_count")?.max(0) as u32,
            })
        })
        .transpose()
    }

    async fn record(&self, entry: &SearchCacheEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO search_cache (region_key, searched_at, result_count)
             VALUES ($1, $2, $3)",
        )
        .bind(&entry.region_key)
        .bind(entry.searched_at)
        .bind(entry.result_count as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
