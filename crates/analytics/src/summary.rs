use analysis_core::stats::{mean, median, positive_values, round2};
use analysis_core::EnrichedRecord;
use serde::{Deserialize, Serialize};

/// Aggregates over a record set. A field is `None` when no record
/// contributed to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryAggregate {
    pub count: usize,
    pub avg_price_to_sales: Option<f64>,
    pub avg_price_to_earnings: Option<f64>,
    pub avg_roic: Option<f64>,
    pub median_ytd_return: Option<f64>,
    pub median_one_month_return: Option<f64>,
    pub median_one_year_return: Option<f64>,
}

/// Means for the multiples, medians for the returns.
///
/// P/S and ROIC average every present value; P/E drops non-positive values
/// since a negative multiple means losses, not cheapness.
pub fn summarize(records: &[EnrichedRecord]) -> SummaryAggregate {
    let present = |f: fn(&EnrichedRecord) -> Option<f64>| -> Vec<f64> {
        records.iter().filter_map(f).filter(|v| v.is_finite()).collect()
    };

    let price_to_sales = present(|r| r.price_to_sales);
    let price_to_earnings = positive_values(records.iter().map(|r| r.price_to_earnings));
    let roic = present(|r| r.roic);

    SummaryAggregate {
        count: records.len(),
        avg_price_to_sales: mean(&price_to_sales).map(round2),
        avg_price_to_earnings: mean(&price_to_earnings).map(round2),
        avg_roic: mean(&roic).map(round2),
        median_ytd_return: median(&present(|r| r.ytd_return)).map(round2),
        median_one_month_return: median(&present(|r| r.one_month_return)).map(round2),
        median_one_year_return: median(&present(|r| r.one_year_return)).map(round2),
    }
}
