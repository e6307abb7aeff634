use analysis_core::{get_json, set_json, AnalysisError, BaseRecord, CachePort, DataType, EnrichedRecord};
use analytics::{SortField, SummaryAggregate};
use chrono::{DateTime, Utc};
use enrichment_orchestrator::{EnrichmentOrchestrator, EnrichmentReport};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::sectors::SectorCatalog;

/// Input for one overview
#[derive(Debug, Clone, Default)]
pub struct OverviewRequest {
    pub sector: Option<String>,
    pub identifiers: Vec<String>,
    /// Seed data per identifier; identifiers without one start from a bare record
    pub base_records: Vec<BaseRecord>,
    pub sort: SortField,
}

impl OverviewRequest {
    pub fn new(identifiers: Vec<String>, base_records: Vec<BaseRecord>) -> Self {
        Self {
            identifiers,
            base_records,
            ..Self::default()
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Unknown field names fall back to market cap
    pub fn with_sort_name(mut self, name: &str) -> Self {
        self.sort = SortField::parse_or_default(name);
        self
    }

    /// Identifiers in request order, without duplicates
    fn unique_identifiers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.identifiers
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }

    /// Cache key: sector, the sorted identifier set and a fingerprint of the
    /// seed data, so requests seeding different names or caps do not share
    /// an entry. Seed prices are left out; the snapshot stage replaces them.
    fn cache_key(&self, seeded: &[EnrichedRecord]) -> String {
        let mut sorted: Vec<&EnrichedRecord> = seeded.iter().collect();
        sorted.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let mut hasher = Sha256::new();
        for record in &sorted {
            hasher.update(record.symbol.as_bytes());
            hasher.update(b"|");
            hasher.update(record.name.as_bytes());
            hasher.update(b"|");
            hasher.update(record.logo_url.as_deref().unwrap_or("").as_bytes());
            hasher.update(b"|");
            hasher.update(record.market_cap.to_bits().to_be_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = hex::encode(hasher.finalize());

        let symbols: Vec<&str> = sorted.iter().map(|r| r.symbol.as_str()).collect();
        let sector = self
            .sector
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "custom".to_string());
        format!("{}:{}:{}", sector, symbols.join(","), &fingerprint[..16])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorOverview {
    pub sector: Option<String>,
    pub sort: SortField,
    pub records: Vec<EnrichedRecord>,
    pub summary: SummaryAggregate,
    pub generated_at: DateTime<Utc>,
    pub report: EnrichmentReport,
}

pub struct OverviewService {
    orchestrator: Arc<EnrichmentOrchestrator>,
    cache: Arc<dyn CachePort>,
    sectors: Arc<SectorCatalog>,
}

impl OverviewService {
    pub fn new(
        orchestrator: Arc<EnrichmentOrchestrator>,
        cache: Arc<dyn CachePort>,
        sectors: Arc<SectorCatalog>,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            sectors,
        }
    }

    /// Cache-first overview of a set of instruments.
    ///
    /// The cache holds the unsorted form; the requested sort is applied on
    /// every return path. Errors only for an unknown sector or cancellation.
    pub async fn build_overview(
        &self,
        mut request: OverviewRequest,
        cancel: &CancellationToken,
    ) -> Result<SectorOverview, AnalysisError> {
        let sector = match request.sector.as_deref() {
            Some(name) => Some(self.sectors.validate(name)?.name.clone()),
            None => None,
        };
        let identifiers = request.unique_identifiers();
        let seeded = seed_records(&identifiers, std::mem::take(&mut request.base_records));
        let cache_key = request.cache_key(&seeded);

        match get_json::<SectorOverview>(self.cache.as_ref(), DataType::SectorOverview, &cache_key).await {
            Ok(Some(cached)) => {
                tracing::debug!("Overview cache hit for {}", cache_key);
                return Ok(sorted(cached, request.sort));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Overview cache read failed for {}: {}", cache_key, e),
        }

        let enrichment = self.orchestrator.enrich(seeded, cancel).await;
        if enrichment.report.cancelled {
            return Err(AnalysisError::Cancelled);
        }

        let mut records = enrichment.records;
        analytics::derive_distance_from_high(&mut records);
        analytics::assign_rs_ranks(&mut records);
        let summary = analytics::summarize(&records);

        let overview = SectorOverview {
            sector,
            sort: SortField::default(),
            records,
            summary,
            generated_at: Utc::now(),
            report: enrichment.report,
        };

        if let Err(e) = set_json(self.cache.as_ref(), DataType::SectorOverview, &cache_key, &overview).await {
            tracing::warn!("Overview cache write failed for {}: {}", cache_key, e);
        }

        Ok(sorted(overview, request.sort))
    }
}

fn sorted(mut overview: SectorOverview, sort: SortField) -> SectorOverview {
    analytics::sort_records(&mut overview.records, sort);
    overview.sort = sort;
    overview
}

/// One record per identifier, in identifier order
fn seed_records(identifiers: &[String], base_records: Vec<BaseRecord>) -> Vec<EnrichedRecord> {
    let mut by_symbol: HashMap<String, BaseRecord> = base_records
        .into_iter()
        .map(|b| (b.symbol.trim().to_ascii_uppercase(), b))
        .collect();

    identifiers
        .iter()
        .map(|symbol| {
            let mut base = by_symbol.remove(symbol).unwrap_or_else(|| BaseRecord {
                symbol: symbol.clone(),
                name: symbol.clone(),
                logo_url: None,
                price: 0.0,
                market_cap: 0.0,
            });
            base.symbol = symbol.clone();
            EnrichedRecord::from(base)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_normalized_and_deduplicated() {
        let request = OverviewRequest::new(
            vec!["aapl".into(), "MSFT".into(), "AAPL".into(), " ".into()],
            Vec::new(),
        );
        assert_eq!(request.unique_identifiers(), vec!["AAPL", "MSFT"]);
    }

    fn base(symbol: &str, name: &str, market_cap: f64) -> BaseRecord {
        BaseRecord {
            symbol: symbol.into(),
            name: name.into(),
            logo_url: None,
            price: 100.0,
            market_cap,
        }
    }

    fn key_for(request: &OverviewRequest) -> String {
        let identifiers = request.unique_identifiers();
        request.cache_key(&seed_records(&identifiers, request.base_records.clone()))
    }

    #[test]
    fn test_cache_key_ignores_order() {
        let seeds = vec![base("AAPL", "Apple", 3.0e12), base("MSFT", "Microsoft", 3.1e12)];
        let a = OverviewRequest::new(vec!["MSFT".into(), "AAPL".into()], seeds.clone()).with_sector("Technology");
        let b = OverviewRequest::new(vec!["AAPL".into(), "MSFT".into()], seeds.into_iter().rev().collect())
            .with_sector("technology");
        assert_eq!(key_for(&a), key_for(&b));
        assert!(key_for(&a).starts_with("technology:AAPL,MSFT:"));
    }

    #[test]
    fn test_cache_key_follows_seed_data() {
        let ids = vec!["AAPL".to_string()];
        let apple = OverviewRequest::new(ids.clone(), vec![base("AAPL", "Apple", 3.0e12)]);
        let renamed = OverviewRequest::new(ids.clone(), vec![base("AAPL", "Apple Inc.", 3.0e12)]);
        let recapped = OverviewRequest::new(ids.clone(), vec![base("AAPL", "Apple", 2.0e12)]);
        let mut repriced = OverviewRequest::new(ids, vec![base("AAPL", "Apple", 3.0e12)]);
        repriced.base_records[0].price = 250.0;

        assert_ne!(key_for(&apple), key_for(&renamed));
        assert_ne!(key_for(&apple), key_for(&recapped));
        assert_eq!(key_for(&apple), key_for(&repriced));
    }

    #[test]
    fn test_seed_records_fill_missing_base() {
        let base = vec![BaseRecord {
            symbol: "aapl".into(),
            name: "Apple Inc.".into(),
            logo_url: None,
            price: 190.0,
            market_cap: 2.9e12,
        }];
        let records = seed_records(&["AAPL".to_string(), "NEW".to_string()], base);
        assert_eq!(records[0].name, "Apple Inc.");
        assert_eq!(records[0].symbol, "AAPL");
        assert_eq!(records[1].name, "NEW");
        assert_eq!(records[1].price, 0.0);
    }

    #[test]
    fn test_unknown_sort_name_defaults_to_market_cap() {
        let request = OverviewRequest::default().with_sort_name("bogus");
        assert_eq!(request.sort, SortField::MarketCap);
    }
}
