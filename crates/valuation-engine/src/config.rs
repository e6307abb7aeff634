use serde::{Deserialize, Serialize};

/// Log-scale mapping from `current / baseline` to a 0-100 percentile:
/// `center + scale * log2(ratio)`, pinned to 0 at or below `lower_ratio`
/// and to 100 at or above `upper_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileCurve {
    pub center: f64,
    pub scale: f64,
    pub lower_ratio: f64,
    pub upper_ratio: f64,
}

impl Default for PercentileCurve {
    fn default() -> Self {
        Self {
            center: 50.0,
            scale: 35.0,
            lower_ratio: 0.0,
            upper_ratio: 3.0,
        }
    }
}

/// Coefficients for the valuation scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationConfig {
    pub curve: PercentileCurve,
    /// Discount rate used for the implied-growth estimate
    pub discount_rate: f64,
    /// DCF gap (percent) beyond which a stock is called under/overvalued
    pub fair_band_percent: f64,
    /// Quarters of history that make up the multi-year baseline (20 = 5 years)
    pub history_quarters: usize,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            curve: PercentileCurve::default(),
            discount_rate: 0.10,
            fair_band_percent: 15.0,
            history_quarters: 20,
        }
    }
}
