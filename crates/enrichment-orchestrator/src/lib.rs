//! Concurrent enrichment of a record set: one stage per data domain, each
//! fanning out per symbol under a concurrency cap, deduplicating in-flight
//! fetches and writing into a shared, index-addressed record set.

pub mod dedup;
pub mod orchestrator;
pub mod record_set;
pub mod report;

pub use dedup::Deduplicator;
pub use orchestrator::{Enrichment, EnrichmentConfig, EnrichmentOrchestrator, Providers};
pub use record_set::RecordSet;
pub use report::{EnrichmentReport, Stage, StageFailure};
pub use tokio_util::sync::CancellationToken;
