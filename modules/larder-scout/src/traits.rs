// Trait abstractions for the pipeline's two external collaborators.
//
// DiscoveryProvider — free-text web search returning partial candidates.
// Verifier — confirms a candidate exists and returns enriched fields or a
//   classified failure.
//
// Both are injected rather than constructed inline so tests can substitute
// deterministic fakes for success and for every failure classification.

use anyhow::Result;
use async_trait::async_trait;

use larder_common::{Candidate, VerifyError, VerifyOutcome, VerifyRequest};

#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Run one free-text discovery query. Returns a finite list of partial
    /// candidate records; order and length are upstream's choice.
    async fn search(&self, query: &str) -> Result<Vec<Candidate>>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify one candidate. `Ok` carries the classified outcome the
    /// enrichment state machine branches on; `Err` separates configuration
    /// failures from transient ones.
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, VerifyError>;
}
