//! Response assembly: cache-first sector overviews and valuation deep-dives
//! on top of the enrichment pipeline and the pure engines.

pub mod config;
pub mod overview;
pub mod sectors;
pub mod valuation;

pub use config::ServiceConfig;
pub use overview::{OverviewRequest, OverviewService, SectorOverview};
pub use sectors::{Sector, SectorCatalog};
pub use valuation::{SourceFailure, ValuationProviders, ValuationReport, ValuationService};
pub use valuation_engine::score_valuation;
