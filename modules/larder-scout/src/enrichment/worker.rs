//! Background enrichment worker. Continuously leases pending records and
//! drives each through verification:
//!
//! NEW -> CLAIMED -> { VERIFIED | RETRY_PENDING -> (re-claimable) | PERMANENTLY_FAILED }
//!
//! The loop bounds in-flight verification calls and stamps leases for a
//! whole claimed batch before dispatching any of it (inside the store's
//! `claim_batch`), so two overlapping poll cycles can never double-claim a
//! record within the lease window. One record's failure never affects its
//! siblings or the loop's liveness.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use larder_common::{
    Config, Resource, VerifyError, VerifyOutcome, VerifyRequest, PERMANENT_CLOSURE_REASON,
    TEMPORARY_CLOSURE_REASON,
};
use larder_store::ResourceStore;

use crate::traits::Verifier;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bound on concurrently dispatched verification calls.
    pub max_in_flight: usize,
    pub poll_interval: StdDuration,
    /// Lease duration L: a stamped record is off-limits for this long.
    pub lease: Duration,
    /// Rate-limit courtesy between successive dispatch starts in a batch.
    pub dispatch_delay: StdDuration,
    /// Hard cap on a single verification call so a stalled upstream cannot
    /// permanently occupy a concurrency slot.
    pub verify_timeout: StdDuration,
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 5,
            poll_interval: StdDuration::from_secs(1),
            lease: Duration::minutes(5),
            dispatch_delay: StdDuration::from_millis(200),
            verify_timeout: StdDuration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_in_flight: config.max_in_flight,
            poll_interval: StdDuration::from_secs(config.poll_interval_secs),
            lease: Duration::seconds(config.lease_secs),
            dispatch_delay: StdDuration::from_millis(config.dispatch_delay_ms),
            verify_timeout: StdDuration::from_secs(config.verify_timeout_secs),
            max_attempts: config.max_attempts,
        }
    }
}

/// Running totals for observability. Configuration errors are counted
/// separately — they block all progress and must not look like ordinary
/// transient churn.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub verified: AtomicU64,
    pub retried: AtomicU64,
    pub permanently_failed: AtomicU64,
    pub config_errors: AtomicU64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.verified.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
            self.permanently_failed.load(Ordering::Relaxed),
            self.config_errors.load(Ordering::Relaxed),
        )
    }
}

/// Stop signal for a running worker.
pub struct WorkerHandle {
    tx: watch::Sender<bool>,
}

impl WorkerHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct EnrichmentWorker {
    store: Arc<dyn ResourceStore>,
    verifier: Arc<dyn Verifier>,
    config: WorkerConfig,
    in_flight: Arc<AtomicUsize>,
    stats: Arc<WorkerStats>,
    shutdown: watch::Receiver<bool>,
}

impl EnrichmentWorker {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        verifier: Arc<dyn Verifier>,
        config: WorkerConfig,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = watch::channel(false);
        let worker = Self {
            store,
            verifier,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(WorkerStats::default()),
            shutdown: rx,
        };
        (worker, WorkerHandle { tx })
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Current number of dispatched-but-unresolved verification calls.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Poll until stopped. Already-dispatched calls are not cancelled on
    /// stop; the loop just stops claiming new work.
    pub async fn run(mut self) {
        info!(
            max_in_flight = self.config.max_in_flight,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Enrichment worker started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *self.shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick(Utc::now()).await {
                warn!(error = %e, "Enrichment tick failed");
            }
        }

        info!("Enrichment worker stopped");
    }

    /// One poll cycle: claim up to the available slots and dispatch each
    /// claimed record independently. Returns the number claimed.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let available = self.config.max_in_flight.saturating_sub(in_flight);
        if available == 0 {
            return Ok(0);
        }

        let batch = self
            .store
            .claim_batch(now, self.config.lease, self.config.max_attempts, available)
            .await?;
        let claimed = batch.len();
        if claimed > 0 {
            info!(claimed, in_flight, "Claimed enrichment batch");
        }

        for (i, record) in batch.into_iter().enumerate() {
            if i > 0 {
                let jitter = rand::rng().random_range(0..100);
                tokio::time::sleep(self.config.dispatch_delay + StdDuration::from_millis(jitter))
                    .await;
            }

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let store = Arc::clone(&self.store);
            let verifier = Arc::clone(&self.verifier);
            let stats = Arc::clone(&self.stats);
            let in_flight = Arc::clone(&self.in_flight);
            let verify_timeout = self.config.verify_timeout;
            let max_attempts = self.config.max_attempts;

            tokio::spawn(async move {
                process_record(store, verifier, stats, verify_timeout, max_attempts, record)
                    .await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }

        Ok(claimed)
    }
}

/// Verify one claimed record and apply its state transition. Isolated:
/// failures are recorded on the record itself, never propagated.
async fn process_record(
    store: Arc<dyn ResourceStore>,
    verifier: Arc<dyn Verifier>,
    stats: Arc<WorkerStats>,
    verify_timeout: StdDuration,
    max_attempts: u32,
    mut record: Resource,
) {
    let request = VerifyRequest::from_resource(&record);

    let outcome = match tokio::time::timeout(verify_timeout, verifier.verify(&request)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(VerifyError::Configuration(msg))) => {
            // Blocks the whole pipeline; not this record's fault. Leave it
            // untouched — the lease expires and it becomes claimable again.
            error!(
                resource = %record.name,
                error = %msg,
                "Verifier configuration error, enrichment cannot progress"
            );
            stats.config_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        Ok(Err(VerifyError::Transient(msg))) => {
            apply_failure(&mut record, &msg);
            finish(&store, &stats, &record, max_attempts, false).await;
            return;
        }
        Err(_) => {
            apply_failure(&mut record, "Verification timed out");
            finish(&store, &stats, &record, max_attempts, false).await;
            return;
        }
    };

    let was_verified = matches!(outcome, VerifyOutcome::Confirmed(_));
    apply_outcome(&mut record, &outcome);
    finish(&store, &stats, &record, max_attempts, was_verified).await;
}

async fn finish(
    store: &Arc<dyn ResourceStore>,
    stats: &WorkerStats,
    record: &Resource,
    max_attempts: u32,
    was_verified: bool,
) {
    if was_verified {
        stats.verified.fetch_add(1, Ordering::Relaxed);
        info!(resource = %record.name, "Resource verified");
    } else if larder_common::is_permanent_closure(record.enrichment_failure_reason.as_deref())
        || record.enrichment_failure_count >= max_attempts
    {
        stats.permanently_failed.fetch_add(1, Ordering::Relaxed);
        info!(
            resource = %record.name,
            reason = record.enrichment_failure_reason.as_deref().unwrap_or(""),
            failures = record.enrichment_failure_count,
            "Resource permanently failed enrichment"
        );
    } else {
        stats.retried.fetch_add(1, Ordering::Relaxed);
    }

    if let Err(e) = store.update(record).await {
        warn!(resource = %record.name, error = %e, "Failed to persist enrichment result");
    }
}

/// Apply the state transition for a classified verification outcome.
pub fn apply_outcome(record: &mut Resource, outcome: &VerifyOutcome) {
    match outcome {
        VerifyOutcome::Confirmed(verified) => record.apply_enrichment(verified),
        VerifyOutcome::PermanentlyClosed => {
            // Terminal immediately — bypasses the attempt budget.
            record.enrichment_failure_reason = Some(PERMANENT_CLOSURE_REASON.to_string());
            record.exportable = false;
        }
        VerifyOutcome::TemporarilyClosed => apply_failure(record, TEMPORARY_CLOSURE_REASON),
        VerifyOutcome::NotFound => apply_failure(record, "Not found"),
        VerifyOutcome::BlockedCategory(kind) => {
            apply_failure(record, &format!("Blocked category: {kind}"))
        }
        VerifyOutcome::NameMismatch { found, .. } => {
            apply_failure(record, &format!("Name mismatch: found \"{found}\""))
        }
    }
}

fn apply_failure(record: &mut Resource, reason: &str) {
    record.enrichment_failure_count += 1;
    record.enrichment_failure_reason = Some(reason.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    use larder_store::MemoryStore;

    use crate::testing::{pending_resource, MockVerdict, MockVerifier};

    fn worker_with(
        store: Arc<MemoryStore>,
        verifier: MockVerifier,
        max_in_flight: usize,
    ) -> EnrichmentWorker {
        let config = WorkerConfig {
            max_in_flight,
            dispatch_delay: StdDuration::from_millis(0),
            ..WorkerConfig::default()
        };
        let (worker, _handle) = EnrichmentWorker::new(store, Arc::new(verifier), config);
        worker
    }

    /// Give spawned verification tasks a chance to resolve.
    async fn settle(worker: &EnrichmentWorker) {
        for _ in 0..100 {
            if worker.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("in-flight verifications did not settle");
    }

    #[tokio::test]
    async fn two_ticks_within_lease_never_claim_the_same_record() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 0..4 {
            let r = pending_resource(&format!("Pantry {i}"), "zip-1", now - Duration::minutes(i));
            store.seed(&r);
        }

        // Verifier that never resolves: records stay claimed for the test
        let worker = worker_with(Arc::clone(&store), MockVerifier::new().hang_all(), 10);

        let first = worker.tick(now).await.unwrap();
        assert_eq!(first, 4);
        assert_eq!(worker.in_flight(), 4);

        // Second cycle 30s later still has free slots, but every record is
        // inside its lease window — nothing may be claimed again.
        let second = worker.tick(now + Duration::seconds(30)).await.unwrap();
        assert_eq!(second, 0);

        // Past the lease boundary the batch becomes claimable again.
        let third = worker.tick(now + Duration::minutes(6)).await.unwrap();
        assert_eq!(third, 4);
    }

    #[tokio::test]
    async fn batch_is_bounded_by_available_slots() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 0..8 {
            store.seed(&pending_resource(
                &format!("Pantry {i}"),
                "zip-1",
                now - Duration::minutes(i),
            ));
        }

        let worker = worker_with(Arc::clone(&store), MockVerifier::new().hang_all(), 3);
        assert_eq!(worker.tick(now).await.unwrap(), 3);
        // All slots occupied — next tick claims nothing
        assert_eq!(worker.tick(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn confirmed_outcome_reaches_verified_state() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut r = pending_resource("St Marys Pantry", "zip-1", now);
        r.enrichment_failure_count = 2;
        r.enrichment_failure_reason = Some("Not found".to_string());
        let id = r.id;
        store.seed(&r);

        let verifier = MockVerifier::new().on_name(
            "St Marys Pantry",
            MockVerdict::Outcome(VerifyOutcome::Confirmed(larder_common::Verified {
                name: "St Marys Food Pantry".to_string(),
                external_id: Some("place-9".to_string()),
                ..Default::default()
            })),
        );
        let worker = worker_with(Arc::clone(&store), verifier, 5);

        assert_eq!(worker.tick(now).await.unwrap(), 1);
        settle(&worker).await;

        let stored = store.get_sync(id);
        assert!(stored.verified);
        assert!(!stored.needs_enrichment);
        assert_eq!(stored.enrichment_failure_count, 0);
        assert_eq!(stored.enrichment_failure_reason, None);
        assert_eq!(worker.stats().verified.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn permanent_closure_is_terminal_even_at_zero_failures() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let r = pending_resource("Closed Pantry", "zip-1", now);
        let id = r.id;
        assert_eq!(r.enrichment_failure_count, 0);
        store.seed(&r);

        let verifier = MockVerifier::new()
            .on_name("Closed Pantry", MockVerdict::Outcome(VerifyOutcome::PermanentlyClosed));
        let worker = worker_with(Arc::clone(&store), verifier, 5);

        worker.tick(now).await.unwrap();
        settle(&worker).await;

        let stored = store.get_sync(id);
        assert!(!stored.exportable);
        assert_eq!(
            stored.enrichment_failure_reason.as_deref(),
            Some(PERMANENT_CLOSURE_REASON)
        );
        assert_eq!(stored.enrichment_failure_count, 0);
        // Terminal: no future tick may claim it
        let later = now + Duration::minutes(10);
        assert_eq!(worker.tick(later).await.unwrap(), 0);
        assert_eq!(
            worker.stats().permanently_failed.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn transient_failures_accumulate_to_three_strikes() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let r = pending_resource("Flaky Pantry", "zip-1", now);
        let id = r.id;
        store.seed(&r);

        let verifier = MockVerifier::new()
            .with_default(MockVerdict::Transient("connection reset".to_string()));
        let worker = worker_with(Arc::clone(&store), verifier, 5);

        for attempt in 1..=3u32 {
            let tick_time = now + Duration::minutes(6 * attempt as i64);
            assert_eq!(worker.tick(tick_time).await.unwrap(), 1);
            settle(&worker).await;
            assert_eq!(store.get_sync(id).enrichment_failure_count, attempt);
        }

        // Three strikes: excluded from claims from now on
        let after = now + Duration::minutes(60);
        assert_eq!(worker.tick(after).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn configuration_error_consumes_no_strike() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let r = pending_resource("Waiting Pantry", "zip-1", now);
        let id = r.id;
        store.seed(&r);

        let verifier =
            MockVerifier::new().with_default(MockVerdict::Config("key missing".to_string()));
        let worker = worker_with(Arc::clone(&store), verifier, 5);

        worker.tick(now).await.unwrap();
        settle(&worker).await;

        let stored = store.get_sync(id);
        assert_eq!(stored.enrichment_failure_count, 0);
        assert_eq!(stored.enrichment_failure_reason, None);
        assert_eq!(worker.stats().config_errors.load(Ordering::Relaxed), 1);

        // Lease expiry makes it claimable again once credentials are fixed
        let later = now + Duration::minutes(6);
        assert_eq!(worker.tick(later).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_failing_record_does_not_affect_siblings() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let good = pending_resource("Good Pantry", "zip-1", now);
        let bad = pending_resource("Bad Pantry", "zip-1", now - Duration::minutes(1));
        let good_id = good.id;
        store.seed(&good);
        store.seed(&bad);

        let verifier = MockVerifier::new()
            .with_default(MockVerdict::Transient("boom".to_string()))
            .on_name(
                "Good Pantry",
                MockVerdict::Outcome(VerifyOutcome::Confirmed(larder_common::Verified {
                    name: "Good Pantry".to_string(),
                    ..Default::default()
                })),
            );
        let worker = worker_with(Arc::clone(&store), verifier, 5);

        assert_eq!(worker.tick(now).await.unwrap(), 2);
        settle(&worker).await;

        assert!(store.get_sync(good_id).verified);
    }

    #[test]
    fn name_mismatch_and_blocked_category_record_reasons() {
        let mut r = pending_resource("Hope Table", "zip-1", Utc::now());
        apply_outcome(
            &mut r,
            &VerifyOutcome::NameMismatch {
                found: "Riverside Auto".to_string(),
                ratio: 0.0,
            },
        );
        assert_eq!(r.enrichment_failure_count, 1);
        assert!(r
            .enrichment_failure_reason
            .as_deref()
            .unwrap()
            .contains("Riverside Auto"));

        apply_outcome(&mut r, &VerifyOutcome::BlockedCategory("bank".to_string()));
        assert_eq!(r.enrichment_failure_count, 2);
        assert!(r
            .enrichment_failure_reason
            .as_deref()
            .unwrap()
            .contains("bank"));
    }
}
