use analysis_core::stats::{mean, median, positive_values, round2};
use analysis_core::{FundamentalRatios, PeerRatio, QuarterlyRatio, RatioKind};
use serde::{Deserialize, Serialize};

use crate::config::PercentileCurve;

/// Multiples shown in the key-metrics table
pub const KEY_METRICS: [RatioKind; 5] = [
    RatioKind::PriceToEarnings,
    RatioKind::PriceToSales,
    RatioKind::PriceToBook,
    RatioKind::EvToEbitda,
    RatioKind::PriceToFcf,
];

/// One row of the key-metrics table: a multiple and every baseline it is
/// compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationContext {
    pub ratio: RatioKind,
    pub label: String,
    pub current: Option<f64>,
    pub historical_min: Option<f64>,
    pub historical_max: Option<f64>,
    /// Average over the configured history window (five years by default)
    pub historical_avg: Option<f64>,
    pub peer_median: Option<f64>,
    pub benchmark_avg: Option<f64>,
    /// 0 (far below baseline) to 100 (far above)
    pub percentile: Option<f64>,
}

/// Percentile of `current` against the mean of the positive baselines.
pub fn composite_percentile(
    current: Option<f64>,
    baselines: &[Option<f64>],
    curve: &PercentileCurve,
) -> Option<f64> {
    let current = current?;
    let baseline = mean(&positive_values(baselines.iter().copied()))?;

    let ratio = current / baseline;
    if ratio <= curve.lower_ratio {
        return Some(0.0);
    }
    if ratio >= curve.upper_ratio {
        return Some(100.0);
    }
    Some(round2((curve.center + curve.scale * ratio.log2()).clamp(0.0, 100.0)))
}

/// Build one key-metrics row.
pub fn build_context(
    kind: RatioKind,
    current: &FundamentalRatios,
    history: &[QuarterlyRatio],
    peers: &[PeerRatio],
    benchmark: Option<&FundamentalRatios>,
    curve: &PercentileCurve,
) -> ValuationContext {
    let current_value = kind.value(current);
    let historical = positive_values(history.iter().map(|q| kind.value(&q.ratios)));
    let historical_min = historical.iter().cloned().reduce(f64::min);
    let historical_max = historical.iter().cloned().reduce(f64::max);
    let historical_avg = mean(&historical).map(round2);
    let peer_median = median(&positive_values(peers.iter().map(|p| kind.value(&p.ratios)))).map(round2);
    let benchmark_avg = benchmark.and_then(|b| kind.value(b)).filter(|v| *v > 0.0);

    let percentile = composite_percentile(
        current_value,
        &[historical_avg, peer_median, benchmark_avg],
        curve,
    );

    ValuationContext {
        ratio: kind,
        label: kind.label().to_string(),
        current: current_value,
        historical_min,
        historical_max,
        historical_avg,
        peer_median,
        benchmark_avg,
        percentile,
    }
}
