use analysis_core::{
    AnalysisError, Bar, BarsProvider, BaseRecord, CachePort, DataType, DcfProvider, DcfRecord,
    FailureKind, FundamentalRatios, PeersProvider, PriceSnapshot, QuarterlyRatio, RatiosProvider,
    SnapshotProvider, TechnicalSignals, TechnicalsProvider,
};
use analytics::SortField;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use enrichment_orchestrator::{CancellationToken, EnrichmentConfig, EnrichmentOrchestrator, Providers};
use market_cache::MemoryCache;
use overview_service::{
    OverviewRequest, OverviewService, SectorCatalog, ValuationProviders, ValuationService,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use valuation_engine::{Sentiment, ValuationConfig};

/// Fixed upstream: per-symbol one-year drift, P/E and peers
struct Universe {
    /// symbol → (daily close step, P/E)
    profiles: HashMap<String, (f64, f64)>,
    peers: Vec<String>,
    fail_peers: bool,
    fail_dcf: bool,
    delay_ms: u64,
    ratios_calls: AtomicUsize,
    bars_calls: AtomicUsize,
}

impl Universe {
    fn new(profiles: &[(&str, f64, f64)]) -> Self {
        Self {
            profiles: profiles
                .iter()
                .map(|(s, step, pe)| (s.to_string(), (*step, *pe)))
                .collect(),
            peers: Vec::new(),
            fail_peers: false,
            fail_dcf: false,
            delay_ms: 0,
            ratios_calls: AtomicUsize::new(0),
            bars_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SnapshotProvider for Universe {
    async fn fetch_snapshots(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>, AnalysisError> {
        Ok(symbols
            .iter()
            .filter(|s| self.profiles.contains_key(*s))
            .map(|s| PriceSnapshot {
                symbol: s.clone(),
                price: 100.0,
                change_percent: None,
                market_cap: Some(1.0e9 * (1.0 + self.profiles[s].0)),
            })
            .collect())
    }
}

#[async_trait]
impl TechnicalsProvider for Universe {
    async fn fetch_technicals(
        &self,
        _symbol: &str,
        reference_price: f64,
    ) -> Result<Option<TechnicalSignals>, AnalysisError> {
        Ok(Some(TechnicalSignals::from_averages(reference_price, Some(95.0), Some(98.0), Some(90.0))))
    }
}

#[async_trait]
impl RatiosProvider for Universe {
    async fn fetch_ratios(&self, symbol: &str) -> Result<Option<FundamentalRatios>, AnalysisError> {
        self.ratios_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_peers && self.peers.iter().any(|p| p == symbol) {
            return Err(AnalysisError::ApiError("HTTP 500".into()));
        }
        Ok(self.profiles.get(symbol).map(|(_, pe)| FundamentalRatios {
            price_to_earnings: Some(*pe),
            price_to_sales: Some(pe / 5.0),
            peg_ratio: Some(1.2),
            roic: Some(15.0),
            ..Default::default()
        }))
    }

    async fn fetch_ratio_history(
        &self,
        symbol: &str,
        quarters: usize,
    ) -> Result<Vec<QuarterlyRatio>, AnalysisError> {
        let base = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let Some((_, pe)) = self.profiles.get(symbol) else {
            return Ok(Vec::new());
        };
        Ok((0..quarters.min(12))
            .map(|i| QuarterlyRatio {
                period_end: base - Duration::days(91 * i as i64),
                ratios: FundamentalRatios {
                    price_to_earnings: Some(pe * (0.6 + 0.05 * i as f64)),
                    ..Default::default()
                },
            })
            .collect())
    }
}

#[async_trait]
impl BarsProvider for Universe {
    async fn fetch_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        self.bars_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let step = self.profiles.get(symbol).map(|p| p.0).unwrap_or(0.0);
        Ok((0..=(to - from).num_days())
            .map(|i| {
                let close = 50.0 + step * i as f64;
                Bar {
                    timestamp: from + Duration::days(i),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 1.0e6,
                    vwap: None,
                }
            })
            .collect())
    }
}

#[async_trait]
impl PeersProvider for Universe {
    async fn fetch_peers(&self, _symbol: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(self.peers.clone())
    }
}

#[async_trait]
impl DcfProvider for Universe {
    async fn fetch_dcf(&self, symbol: &str) -> Result<Option<DcfRecord>, AnalysisError> {
        if self.fail_dcf {
            return Err(AnalysisError::ApiError("HTTP 503".into()));
        }
        Ok(Some(DcfRecord {
            symbol: symbol.to_string(),
            intrinsic_value: 80.0,
            price: 100.0,
        }))
    }
}

/// Cache that never remembers anything
struct NullCache;

#[async_trait]
impl CachePort for NullCache {
    async fn get(&self, _data_type: DataType, _key: &str) -> Result<Option<String>, AnalysisError> {
        Ok(None)
    }

    async fn set(&self, _data_type: DataType, _key: &str, _payload: String) -> Result<(), AnalysisError> {
        Ok(())
    }
}

fn overview_service(universe: Arc<Universe>, cache: Arc<dyn CachePort>) -> OverviewService {
    let orchestrator = EnrichmentOrchestrator::new(
        Providers::from_shared(universe),
        Arc::clone(&cache),
        EnrichmentConfig::default(),
    );
    OverviewService::new(Arc::new(orchestrator), cache, Arc::new(SectorCatalog::builtin()))
}

fn tech_universe() -> Universe {
    Universe::new(&[("AAPL", 0.10, 30.0), ("MSFT", 0.20, 35.0), ("IBM", -0.05, 20.0), ("NVDA", 0.40, 60.0)])
}

fn request(sort: &str) -> OverviewRequest {
    let symbols = ["AAPL", "MSFT", "IBM", "NVDA"];
    let base = symbols
        .iter()
        .map(|s| BaseRecord {
            symbol: s.to_string(),
            name: format!("{} Inc.", s),
            logo_url: None,
            price: 0.0,
            market_cap: 0.0,
        })
        .collect();
    OverviewRequest::new(symbols.iter().map(|s| s.to_string()).collect(), base)
        .with_sector("Technology")
        .with_sort_name(sort)
}

#[tokio::test]
async fn test_overview_ranks_sorts_and_summarizes() {
    let service = overview_service(Arc::new(tech_universe()), Arc::new(MemoryCache::new()));

    let overview = service
        .build_overview(request("1y"), &CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = overview.records.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(order, vec!["NVDA", "MSFT", "AAPL", "IBM"]);
    assert_eq!(overview.records[0].rs_rank, Some(99));
    assert!(overview.records[3].rs_rank < overview.records[0].rs_rank);
    assert_eq!(overview.sector.as_deref(), Some("Technology"));
    assert_eq!(overview.summary.count, 4);
    assert_eq!(overview.summary.avg_roic, Some(15.0));
    assert!(overview.records.iter().all(|r| r.pct_from_high.is_some()));
    assert!(overview.report.is_clean());
}

#[tokio::test]
async fn test_overview_is_idempotent() {
    let service = overview_service(Arc::new(tech_universe()), Arc::new(NullCache));
    let cancel = CancellationToken::new();

    let first = service.build_overview(request("ytd"), &cancel).await.unwrap();
    let second = service.build_overview(request("ytd"), &cancel).await.unwrap();

    assert_eq!(first.records, second.records);
    assert_eq!(first.summary, second.summary);
}

#[tokio::test]
async fn test_cached_overview_is_resorted_per_request() {
    let universe = Arc::new(tech_universe());
    let service = overview_service(Arc::clone(&universe), Arc::new(MemoryCache::new()));
    let cancel = CancellationToken::new();

    let by_return = service.build_overview(request("1y"), &cancel).await.unwrap();
    let by_pe = service.build_overview(request("pe"), &cancel).await.unwrap();

    // Second request came from the cache but with its own order
    assert_eq!(universe.bars_calls.load(Ordering::SeqCst), 4);
    assert_eq!(by_pe.sort, SortField::PriceToEarnings);
    assert_eq!(by_pe.records[0].symbol, "IBM");
    assert_eq!(by_return.records[0].symbol, "NVDA");
    assert_eq!(by_return.generated_at, by_pe.generated_at);
}

#[tokio::test]
async fn test_unknown_sector_is_rejected() {
    let service = overview_service(Arc::new(tech_universe()), Arc::new(MemoryCache::new()));
    let result = service
        .build_overview(request("1y").with_sector("Crypto"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AnalysisError::InvalidData(_))));
}

#[tokio::test]
async fn test_cancelled_overview_is_not_cached() {
    let mut slow = tech_universe();
    slow.delay_ms = 5_000;
    let cache: Arc<dyn CachePort> = Arc::new(MemoryCache::new());
    let service = overview_service(Arc::new(slow), Arc::clone(&cache));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = service.build_overview(request("1y"), &cancel).await;
    assert_eq!(result, Err(AnalysisError::Cancelled));

    // Same request on the same cache has to enrich from scratch
    let fast = Arc::new(tech_universe());
    let retry = overview_service(Arc::clone(&fast), cache);
    retry.build_overview(request("1y"), &CancellationToken::new()).await.unwrap();
    assert_eq!(fast.bars_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_different_seed_data_does_not_share_cached_overview() {
    let universe = Arc::new(tech_universe());
    let service = overview_service(Arc::clone(&universe), Arc::new(MemoryCache::new()));
    let cancel = CancellationToken::new();

    let first = service.build_overview(request("1y"), &cancel).await.unwrap();

    let mut renamed = request("1y");
    for base in renamed.base_records.iter_mut() {
        base.name = format!("{} Holdings", base.symbol);
    }
    let second = service.build_overview(renamed, &cancel).await.unwrap();

    assert!(first.records.iter().all(|r| r.name.ends_with(" Inc.")));
    assert!(second.records.iter().all(|r| r.name.ends_with(" Holdings")));
}

fn valuation_service(universe: Arc<Universe>, cache: Arc<dyn CachePort>) -> ValuationService {
    valuation_service_with(universe, cache, ValuationConfig::default())
}

fn valuation_service_with(
    universe: Arc<Universe>,
    cache: Arc<dyn CachePort>,
    config: ValuationConfig,
) -> ValuationService {
    let orchestrator = EnrichmentOrchestrator::new(
        Providers::from_shared(Arc::clone(&universe)),
        Arc::clone(&cache),
        EnrichmentConfig::default(),
    );
    ValuationService::new(
        ValuationProviders::from_shared(universe),
        cache,
        orchestrator.ratios_deduplicator(),
        Arc::new(SectorCatalog::builtin()),
        config,
    )
}

#[tokio::test]
async fn test_valuation_scores_against_history_peers_and_sector() {
    let mut universe = tech_universe();
    universe.peers = vec!["MSFT".into(), "IBM".into(), "AAPL".into()];
    let service = valuation_service(Arc::new(universe), Arc::new(MemoryCache::new()));

    let report = service
        .valuation("aapl", Some("technology"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.symbol, "AAPL");
    assert_eq!(report.peers, vec!["MSFT", "IBM"]);
    assert!(report.failures.is_empty());

    let valuation = &report.valuation;
    // History runs 18.0..34.5, so 30 sits in the upper third
    let historical = valuation.historical.as_ref().unwrap();
    assert_eq!(historical.periods, 12);
    assert_eq!(historical.score, 8);
    // One of two peers (IBM at 20) is below 30
    assert_eq!(valuation.peer.as_ref().unwrap().score, 5);
    assert_eq!(valuation.growth.as_ref().unwrap().score, 6);
    let pe_row = &valuation.key_metrics[0];
    assert_eq!(pe_row.benchmark_avg, Some(28.0));
    assert_eq!(
        valuation.dcf.as_ref().map(|d| d.classification),
        Some(valuation_engine::DcfClassification::Overvalued)
    );
    assert_eq!(valuation.verdict.sentiment, Sentiment::Fair);
}

#[tokio::test]
async fn test_valuation_tolerates_failed_peers() {
    let mut universe = tech_universe();
    universe.peers = vec!["MSFT".into(), "IBM".into()];
    universe.fail_peers = true;
    let cache = Arc::new(MemoryCache::new());
    let service = valuation_service(Arc::new(universe), cache.clone());

    let report = service
        .valuation("AAPL", None, &CancellationToken::new())
        .await
        .unwrap();

    // Peer ratios failed individually: no peer score, but the rest is intact
    assert!(report.valuation.peer.is_none());
    assert!(report.valuation.historical.is_some());
    assert!(report.failures.is_empty());
    assert_eq!(report.valuation.verdict.sentiment, Sentiment::Expensive);
    assert!(cache.get(DataType::Valuation, "AAPL").await.unwrap().is_some());
}

#[tokio::test]
async fn test_degraded_valuation_is_reported_and_not_cached() {
    let mut universe = tech_universe();
    universe.fail_dcf = true;
    let cache = Arc::new(MemoryCache::new());
    let service = valuation_service(Arc::new(universe), cache.clone());

    let report = service
        .valuation("AAPL", Some("Technology"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.valuation.dcf.is_none());
    assert!(report.valuation.historical.is_some());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, "dcf");
    assert_eq!(report.failures[0].kind, FailureKind::UpstreamUnavailable);
    assert_eq!(cache.get(DataType::Valuation, "AAPL:technology").await, Ok(None));
}

#[tokio::test]
async fn test_valuation_unknown_sector_is_rejected() {
    let service = valuation_service(Arc::new(tech_universe()), Arc::new(MemoryCache::new()));
    let result = service
        .valuation("AAPL", Some("Crypto"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AnalysisError::InvalidData(_))));
}

#[tokio::test]
async fn test_ratio_history_cache_is_per_window() {
    let universe = Arc::new(tech_universe());
    let cache: Arc<dyn CachePort> = Arc::new(MemoryCache::new());
    let long = valuation_service(Arc::clone(&universe), Arc::clone(&cache));
    let short = valuation_service_with(
        Arc::clone(&universe),
        cache,
        ValuationConfig {
            history_quarters: 8,
            ..ValuationConfig::default()
        },
    );
    let cancel = CancellationToken::new();

    let wide = long.valuation("AAPL", None, &cancel).await.unwrap();
    // Different report key, same symbol: only the history entry could be shared
    let narrow = short.valuation("AAPL", Some("Technology"), &cancel).await.unwrap();

    assert_eq!(wide.valuation.historical.as_ref().map(|h| h.periods), Some(12));
    assert_eq!(narrow.valuation.historical.as_ref().map(|h| h.periods), Some(8));
}

#[tokio::test]
async fn test_valuation_cache_hit() {
    let universe = Arc::new(tech_universe());
    let service = valuation_service(Arc::clone(&universe), Arc::new(MemoryCache::new()));
    let cancel = CancellationToken::new();

    let first = service.valuation("MSFT", None, &cancel).await.unwrap();
    let calls = universe.ratios_calls.load(Ordering::SeqCst);
    let second = service.valuation("MSFT", None, &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(universe.ratios_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_valuation_unknown_symbol_is_insufficient() {
    let service = valuation_service(Arc::new(tech_universe()), Arc::new(MemoryCache::new()));
    let report = service
        .valuation("ZZZZ", None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.valuation.historical.is_none());
    assert!(report.valuation.growth.is_none());
    assert_eq!(report.valuation.verdict.headline, "Insufficient data for valuation verdict");
    assert!(report.failures.iter().all(|f| f.kind != FailureKind::Cancelled));
}
