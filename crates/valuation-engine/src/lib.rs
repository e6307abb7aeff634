//! Valuation scoring: where a stock's multiples sit against its own history,
//! its peers and a sector benchmark, rolled up into a 1-10 score set and a
//! verdict. Pure functions; missing inputs produce absent scores, never
//! errors.

pub mod config;
pub mod context;
pub mod dcf;
pub mod scores;
pub mod verdict;

pub use config::{PercentileCurve, ValuationConfig};
pub use context::{build_context, composite_percentile, ValuationContext, KEY_METRICS};
pub use dcf::{assess_dcf, DcfAssessment, DcfClassification};
pub use scores::{
    growth_score, historical_score, peer_medians, peer_score, score_from_percentile,
    GrowthScore, HistoricalScore, PeerScore,
};
pub use verdict::{verdict, Sentiment, Verdict};

use analysis_core::{DcfRecord, FundamentalRatios, PeerRatio, QuarterlyRatio};
use serde::{Deserialize, Serialize};

/// Full valuation deep-dive for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub current: FundamentalRatios,
    pub historical: Option<HistoricalScore>,
    pub peer: Option<PeerScore>,
    pub growth: Option<GrowthScore>,
    pub key_metrics: Vec<ValuationContext>,
    pub dcf: Option<DcfAssessment>,
    pub verdict: Verdict,
}

/// Score a stock's valuation.
///
/// `history` is most-recent-first; only the first `config.history_quarters`
/// entries form the historical baseline. `benchmark` carries sector medians
/// when the sector is known.
pub fn score_valuation(
    current: &FundamentalRatios,
    history: &[QuarterlyRatio],
    peers: &[PeerRatio],
    dcf: Option<&DcfRecord>,
    benchmark: Option<&FundamentalRatios>,
    config: &ValuationConfig,
) -> ValuationResult {
    let window = &history[..history.len().min(config.history_quarters)];

    let pe_history: Vec<Option<f64>> = window.iter().map(|q| q.ratios.price_to_earnings).collect();
    let historical = historical_score(current.price_to_earnings, &pe_history);
    let peer = peer_score(current.price_to_earnings, peers);
    let growth = growth_score(current.peg_ratio);

    let key_metrics = KEY_METRICS
        .iter()
        .map(|kind| build_context(*kind, current, window, peers, benchmark, &config.curve))
        .collect();

    let dcf = assess_dcf(dcf, current.price_to_earnings, config);
    let verdict = verdict(
        historical.as_ref().map(|h| h.score),
        peer.as_ref().map(|p| p.score),
        growth.as_ref().map(|g| g.score),
    );

    ValuationResult {
        current: current.clone(),
        historical,
        peer,
        growth,
        key_metrics,
        dcf,
        verdict,
    }
}
