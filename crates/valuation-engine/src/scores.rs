//! The three component scores (historical, peer, growth), each on a 1-10
//! scale where higher means more expensive.

use analysis_core::stats::{mean, median, positive_values, round2};
use analysis_core::{FundamentalRatios, PeerRatio, RatioKind};
use serde::{Deserialize, Serialize};

/// Current multiple against its own multi-period range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalScore {
    pub score: u8,
    pub percentile: f64,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub periods: usize,
}

/// Current multiple against the peer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerScore {
    pub score: u8,
    pub percentile: f64,
    pub current: f64,
    pub peer_count: usize,
    pub peer_median: Option<f64>,
    /// Peer medians for the auxiliary multiples; context only.
    pub peer_medians: FundamentalRatios,
}

/// PEG bucket score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthScore {
    pub score: u8,
    pub peg: f64,
}

/// `ceil(percentile / 10)` clamped to 1..=10.
pub fn score_from_percentile(percentile: f64) -> u8 {
    (percentile / 10.0).ceil().clamp(1.0, 10.0) as u8
}

/// Position of `current` between the min and max of `history`.
/// Needs a positive current value and at least two positive history points;
/// a flat history puts the stock at the 50th percentile.
pub fn historical_score(current: Option<f64>, history: &[Option<f64>]) -> Option<HistoricalScore> {
    let current = current.filter(|c| *c > 0.0)?;
    let values = positive_values(history.iter().copied());
    if values.len() < 2 {
        return None;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let average = mean(&values)?;

    let percentile = if (max - min).abs() < f64::EPSILON {
        50.0
    } else {
        ((current - min) / (max - min) * 100.0).clamp(0.0, 100.0)
    };

    Some(HistoricalScore {
        score: score_from_percentile(percentile),
        percentile: round2(percentile),
        current,
        min,
        max,
        average: round2(average),
        periods: values.len(),
    })
}

/// Share of peers whose P/E sits strictly below the current one.
pub fn peer_score(current: Option<f64>, peers: &[PeerRatio]) -> Option<PeerScore> {
    let current = current.filter(|c| *c > 0.0)?;
    let peer_values = positive_values(peers.iter().map(|p| p.ratios.price_to_earnings));
    if peer_values.is_empty() {
        return None;
    }
    let below = peer_values.iter().filter(|v| **v < current).count();
    let percentile = below as f64 / peer_values.len() as f64 * 100.0;

    Some(PeerScore {
        score: score_from_percentile(percentile),
        percentile: round2(percentile),
        current,
        peer_count: peer_values.len(),
        peer_median: median(&peer_values).map(round2),
        peer_medians: peer_medians(peers),
    })
}

/// Median of the positive peer values for every multiple.
pub fn peer_medians(peers: &[PeerRatio]) -> FundamentalRatios {
    let median_of = |kind: RatioKind| {
        let values = positive_values(peers.iter().map(|p| kind.value(&p.ratios)));
        median(&values).map(round2)
    };
    FundamentalRatios {
        price_to_earnings: median_of(RatioKind::PriceToEarnings),
        price_to_sales: median_of(RatioKind::PriceToSales),
        price_to_book: median_of(RatioKind::PriceToBook),
        ev_to_ebitda: median_of(RatioKind::EvToEbitda),
        price_to_fcf: median_of(RatioKind::PriceToFcf),
        peg_ratio: median_of(RatioKind::Peg),
        roic: None,
        revenue_growth: None,
    }
}

/// PEG buckets: <0.5 → 2, <1.0 → 4, <1.5 → 6, <2.0 → 8, otherwise 10.
pub fn growth_score(peg: Option<f64>) -> Option<GrowthScore> {
    let peg = peg.filter(|p| p.is_finite() && *p > 0.0)?;
    let score = if peg < 0.5 {
        2
    } else if peg < 1.0 {
        4
    } else if peg < 1.5 {
        6
    } else if peg < 2.0 {
        8
    } else {
        10
    };
    Some(GrowthScore { score, peg })
}
