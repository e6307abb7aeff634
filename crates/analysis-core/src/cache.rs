use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AnalysisError, CachePort};

/// Cache domains. Each has its own freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Snapshot,
    Technicals,
    Ratios,
    RatioHistory,
    PriceHistory,
    Peers,
    Dcf,
    SectorOverview,
    Valuation,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::Snapshot,
        DataType::Technicals,
        DataType::Ratios,
        DataType::RatioHistory,
        DataType::PriceHistory,
        DataType::Peers,
        DataType::Dcf,
        DataType::SectorOverview,
        DataType::Valuation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Snapshot => "snapshot",
            DataType::Technicals => "technicals",
            DataType::Ratios => "ratios",
            DataType::RatioHistory => "ratio_history",
            DataType::PriceHistory => "price_history",
            DataType::Peers => "peers",
            DataType::Dcf => "dcf",
            DataType::SectorOverview => "sector_overview",
            DataType::Valuation => "valuation",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed cache read. A payload that no longer deserializes is reported as a
/// cache error so callers treat it as a miss.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CachePort,
    data_type: DataType,
    key: &str,
) -> Result<Option<T>, AnalysisError> {
    match cache.get(data_type, key).await? {
        Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

/// Typed cache write.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CachePort,
    data_type: DataType,
    key: &str,
    value: &T,
) -> Result<(), AnalysisError> {
    let payload = serde_json::to_string(value)?;
    cache.set(data_type, key, payload).await
}
