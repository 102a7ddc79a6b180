pub mod verify;
pub mod worker;

pub use verify::PlacesVerifier;
pub use worker::{EnrichmentWorker, WorkerConfig, WorkerHandle, WorkerStats};
