pub mod discovery;
pub mod enrichment;
pub mod locality;
pub mod matcher;
pub mod source_filter;
pub mod suspicion;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
