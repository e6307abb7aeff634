use analysis_core::DataType;
use std::collections::HashMap;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Freshness window per cache domain.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    overrides: HashMap<DataType, Duration>,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheTtls {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Replace the window for one domain.
    pub fn with_ttl(mut self, data_type: DataType, ttl: Duration) -> Self {
        self.overrides.insert(data_type, ttl);
        self
    }

    pub fn ttl(&self, data_type: DataType) -> Duration {
        if let Some(ttl) = self.overrides.get(&data_type) {
            return *ttl;
        }
        Duration::from_secs(match data_type {
            DataType::Snapshot => MINUTE,
            DataType::Technicals => HOUR,
            // Quarterly fundamentals only move on filings
            DataType::Ratios => 7 * DAY,
            DataType::RatioHistory => 7 * DAY,
            DataType::PriceHistory => 12 * HOUR,
            DataType::Peers => 7 * DAY,
            DataType::Dcf => DAY,
            DataType::SectorOverview => 5 * MINUTE,
            DataType::Valuation => 6 * HOUR,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.ttl(DataType::Ratios), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(ttls.ttl(DataType::SectorOverview), Duration::from_secs(300));
        assert_eq!(ttls.ttl(DataType::Snapshot), Duration::from_secs(60));
    }

    #[test]
    fn test_override() {
        let ttls = CacheTtls::new().with_ttl(DataType::Peers, Duration::from_secs(5));
        assert_eq!(ttls.ttl(DataType::Peers), Duration::from_secs(5));
        assert_eq!(ttls.ttl(DataType::Dcf), Duration::from_secs(24 * 3600));
    }
}
