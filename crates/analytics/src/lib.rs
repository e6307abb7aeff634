//! Pure analytics over an enriched record set: sampling, period returns,
//! 52-week range, relative-strength ranks, summary aggregates and sorting.
//! Nothing in here performs I/O.

pub mod ranking;
pub mod returns;
pub mod sampling;
pub mod sorting;
pub mod summary;

pub use ranking::{assign_rs_ranks, rs_ranks};
pub use returns::{compute_returns, price_range, PeriodReturns, PriceRange};
pub use sampling::{chart_series, sample, sparkline};
pub use sorting::{sort_records, SortDirection, SortField};
pub use summary::{summarize, SummaryAggregate};

use analysis_core::stats::round2;
use analysis_core::EnrichedRecord;

/// Fill `pct_from_high` from each record's price and 52-week high.
///
/// Runs after enrichment has joined, since price and high come from
/// different stages.
pub fn derive_distance_from_high(records: &mut [EnrichedRecord]) {
    for record in records.iter_mut() {
        record.pct_from_high = match record.high_52w {
            Some(high) if high > 0.0 && record.price > 0.0 => {
                Some(round2((record.price - high) / high * 100.0))
            }
            _ => None,
        };
    }
}
