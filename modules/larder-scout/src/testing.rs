// Test mocks for the pipeline's two adapter seams.
//
// - MockDiscovery (DiscoveryProvider) — HashMap-based query→candidates
// - MockVerifier (Verifier) — per-name verdicts covering success and every
//   failure classification, plus a hang mode for lease/concurrency tests
//
// Plus shared factories for candidates and pending resources.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use larder_common::{
    Candidate, Resource, ResourceCategory, VerifyError, VerifyOutcome, VerifyRequest,
};

use crate::traits::{DiscoveryProvider, Verifier};

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// A pantry candidate at a fixed address.
pub fn candidate(name: &str) -> Candidate {
    candidate_at(name, "123 Main St")
}

pub fn candidate_at(name: &str, address: &str) -> Candidate {
    Candidate {
        name: name.to_string(),
        address: address.to_string(),
        city: Some("Stillwater".to_string()),
        state: Some("MN".to_string()),
        category: ResourceCategory::FoodPantry,
        source_url: None,
        phone: None,
        hours: None,
    }
}

/// An unverified resource awaiting enrichment.
pub fn pending_resource(name: &str, region_key: &str, created_at: DateTime<Utc>) -> Resource {
    Resource::from_candidate(&candidate(name), region_key, created_at)
}

// ---------------------------------------------------------------------------
// MockDiscovery
// ---------------------------------------------------------------------------

/// HashMap-based discovery provider. Unregistered queries return an empty
/// list (a search that found nothing, not an error) unless `fail_unknown`
/// is set. Records every query for call-count assertions.
pub struct MockDiscovery {
    responses: HashMap<String, Vec<Candidate>>,
    fail_unknown: bool,
    calls: Mutex<Vec<String>>,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fail_unknown: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
        self.responses.insert(query.to_string(), candidates);
        self
    }

    /// Make unregistered queries fail instead of returning empty.
    pub fn fail_unknown(mut self) -> Self {
        self.fail_unknown = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryProvider for MockDiscovery {
    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        self.calls.lock().unwrap().push(query.to_string());
        match self.responses.get(query) {
            Some(candidates) => Ok(candidates.clone()),
            None if self.fail_unknown => {
                anyhow::bail!("MockDiscovery: no response registered for {query}")
            }
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockVerifier
// ---------------------------------------------------------------------------

/// What a mock verification of a given name should produce.
#[derive(Debug, Clone)]
pub enum MockVerdict {
    Outcome(VerifyOutcome),
    Config(String),
    Transient(String),
    /// Never resolve — occupies a concurrency slot forever.
    Hang,
}

pub struct MockVerifier {
    verdicts: HashMap<String, MockVerdict>,
    default: MockVerdict,
    calls: Mutex<Vec<String>>,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self {
            verdicts: HashMap::new(),
            default: MockVerdict::Outcome(VerifyOutcome::NotFound),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_name(mut self, name: &str, verdict: MockVerdict) -> Self {
        self.verdicts.insert(name.to_string(), verdict);
        self
    }

    pub fn with_default(mut self, verdict: MockVerdict) -> Self {
        self.default = verdict;
        self
    }

    pub fn hang_all(self) -> Self {
        self.with_default(MockVerdict::Hang)
    }

    /// Shorthand: confirm a name, echoing it back as the found name.
    pub fn confirming(self, name: &str) -> Self {
        let verified = larder_common::Verified {
            name: name.to_string(),
            external_id: Some(format!("place-{}", name.to_lowercase().replace(' ', "-"))),
            ..Default::default()
        };
        self.on_name(name, MockVerdict::Outcome(VerifyOutcome::Confirmed(verified)))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Verifier for MockVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, VerifyError> {
        self.calls.lock().unwrap().push(request.name.clone());
        let verdict = self
            .verdicts
            .get(&request.name)
            .unwrap_or(&self.default)
            .clone();
        match verdict {
            MockVerdict::Outcome(outcome) => Ok(outcome),
            MockVerdict::Config(msg) => Err(VerifyError::Configuration(msg)),
            MockVerdict::Transient(msg) => Err(VerifyError::Transient(msg)),
            MockVerdict::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
