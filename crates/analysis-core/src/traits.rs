use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::DataType;
use crate::{
    AnalysisError, Bar, DcfRecord, FundamentalRatios, PriceSnapshot, QuarterlyRatio,
    TechnicalSignals,
};

/// Key-value cache keyed by `(data_type, key)`. Payloads are JSON text; use
/// [`crate::get_json`] / [`crate::set_json`] for typed access. Freshness is
/// the implementation's concern.
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, data_type: DataType, key: &str) -> Result<Option<String>, AnalysisError>;

    async fn set(&self, data_type: DataType, key: &str, payload: String) -> Result<(), AnalysisError>;
}

/// Batch quote snapshot for a list of symbols. Symbols the upstream does not
/// know are simply missing from the result.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshots(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>, AnalysisError>;
}

/// Moving-average trend flags relative to `reference_price`.
/// `Ok(None)` means the upstream has no data for the symbol.
#[async_trait]
pub trait TechnicalsProvider: Send + Sync {
    async fn fetch_technicals(
        &self,
        symbol: &str,
        reference_price: f64,
    ) -> Result<Option<TechnicalSignals>, AnalysisError>;
}

/// Current and quarterly fundamental ratios.
#[async_trait]
pub trait RatiosProvider: Send + Sync {
    async fn fetch_ratios(&self, symbol: &str) -> Result<Option<FundamentalRatios>, AnalysisError>;

    /// Most recent quarter first, at most `quarters` entries.
    async fn fetch_ratio_history(
        &self,
        symbol: &str,
        quarters: usize,
    ) -> Result<Vec<QuarterlyRatio>, AnalysisError>;
}

/// Daily bars between `from` and `to`, oldest first.
#[async_trait]
pub trait BarsProvider: Send + Sync {
    async fn fetch_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError>;
}

/// Related companies for peer comparison.
#[async_trait]
pub trait PeersProvider: Send + Sync {
    async fn fetch_peers(&self, symbol: &str) -> Result<Vec<String>, AnalysisError>;
}

#[async_trait]
pub trait DcfProvider: Send + Sync {
    async fn fetch_dcf(&self, symbol: &str) -> Result<Option<DcfRecord>, AnalysisError>;
}
