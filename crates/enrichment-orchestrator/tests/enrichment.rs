use analysis_core::{
    AnalysisError, Bar, BarsProvider, BaseRecord, CachePort, DataType, EnrichedRecord,
    FailureKind, FundamentalRatios, PriceSnapshot, QuarterlyRatio, RatiosProvider,
    SnapshotProvider, TechnicalSignals, TechnicalsProvider,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use enrichment_orchestrator::{
    CancellationToken, EnrichmentConfig, EnrichmentOrchestrator, Providers, Stage,
};
use market_cache::MemoryCache;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Current and peak concurrent calls into one domain
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Scriptable upstream covering all four enrichment domains
#[derive(Default)]
struct FakeMarket {
    delay_ms: u64,
    /// Symbols whose ratios call fails
    failing_ratios: HashSet<String>,
    /// Symbols that come back from the snapshot batch with a zero price
    zero_price: HashSet<String>,
    /// Symbols the snapshot batch does not know
    unknown: HashSet<String>,
    snapshot_calls: AtomicUsize,
    technicals_calls: AtomicUsize,
    ratios_calls: AtomicUsize,
    bars_calls: AtomicUsize,
    technicals_gauge: Gauge,
    ratios_gauge: Gauge,
    bars_gauge: Gauge,
}

impl FakeMarket {
    async fn pause(&self, gauge: &Gauge) {
        gauge.enter();
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        gauge.leave();
    }
}

#[async_trait]
impl SnapshotProvider for FakeMarket {
    async fn fetch_snapshots(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>, AnalysisError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(symbols
            .iter()
            .filter(|s| !self.unknown.contains(*s))
            .map(|s| PriceSnapshot {
                symbol: s.clone(),
                price: if self.zero_price.contains(s) { 0.0 } else { 110.0 },
                change_percent: Some(1.0),
                market_cap: None,
            })
            .collect())
    }
}

#[async_trait]
impl TechnicalsProvider for FakeMarket {
    async fn fetch_technicals(
        &self,
        _symbol: &str,
        reference_price: f64,
    ) -> Result<Option<TechnicalSignals>, AnalysisError> {
        self.technicals_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(&self.technicals_gauge).await;
        Ok(Some(TechnicalSignals::from_averages(
            reference_price,
            Some(100.0),
            Some(105.0),
            Some(120.0),
        )))
    }
}

#[async_trait]
impl RatiosProvider for FakeMarket {
    async fn fetch_ratios(&self, symbol: &str) -> Result<Option<FundamentalRatios>, AnalysisError> {
        self.ratios_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(&self.ratios_gauge).await;
        if self.failing_ratios.contains(symbol) {
            return Err(AnalysisError::ApiError("HTTP 502".into()));
        }
        Ok(Some(FundamentalRatios {
            price_to_earnings: Some(25.0),
            price_to_sales: Some(6.0),
            roic: Some(18.0),
            ..Default::default()
        }))
    }

    async fn fetch_ratio_history(
        &self,
        _symbol: &str,
        _quarters: usize,
    ) -> Result<Vec<QuarterlyRatio>, AnalysisError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl BarsProvider for FakeMarket {
    async fn fetch_bars(
        &self,
        _symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        self.bars_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(&self.bars_gauge).await;
        let days = (to - from).num_days();
        Ok((0..=days)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                Bar {
                    timestamp: from + Duration::days(i),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                    vwap: None,
                }
            })
            .collect())
    }
}

/// Cache that is always down
struct BrokenCache;

#[async_trait]
impl CachePort for BrokenCache {
    async fn get(&self, _data_type: DataType, _key: &str) -> Result<Option<String>, AnalysisError> {
        Err(AnalysisError::CacheError("connection refused".into()))
    }

    async fn set(&self, _data_type: DataType, _key: &str, _payload: String) -> Result<(), AnalysisError> {
        Err(AnalysisError::CacheError("connection refused".into()))
    }
}

fn seed(symbols: &[&str]) -> Vec<EnrichedRecord> {
    symbols
        .iter()
        .map(|s| {
            EnrichedRecord::from(BaseRecord {
                symbol: s.to_string(),
                name: format!("{} Corp", s),
                logo_url: None,
                price: 95.0,
                market_cap: 1.0e10,
            })
        })
        .collect()
}

fn orchestrator(market: Arc<FakeMarket>, cache: Arc<dyn CachePort>, concurrency: usize) -> EnrichmentOrchestrator {
    let config = EnrichmentConfig {
        concurrency,
        ..EnrichmentConfig::default()
    };
    EnrichmentOrchestrator::new(Providers::from_shared(market), cache, config)
}

#[tokio::test]
async fn test_every_stage_fills_its_fields() {
    let market = Arc::new(FakeMarket::default());
    let orch = orchestrator(Arc::clone(&market), Arc::new(MemoryCache::new()), 5);

    let result = orch.enrich(seed(&["AAPL", "MSFT"]), &CancellationToken::new()).await;

    assert!(result.report.is_clean(), "{:?}", result.report);
    assert_eq!(result.records.len(), 2);
    for record in &result.records {
        assert_eq!(record.price, 110.0);
        assert_eq!(record.price_to_earnings, Some(25.0));
        assert_eq!(record.price_to_sales, Some(6.0));
        assert_eq!(record.roic, Some(18.0));
        assert!(record.above_sma_20.is_some());
        assert!(record.one_year_return.is_some());
        assert!(record.high_52w.is_some());
        assert_eq!(record.sparkline.as_ref().map(Vec::len), Some(30));
        // Full resolution: one point per daily bar over 365 days
        assert_eq!(record.chart.as_ref().map(Vec::len), Some(366));
    }
    assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), 1);
    // Slot order follows the seed order
    assert_eq!(result.records[0].symbol, "AAPL");
}

#[tokio::test]
async fn test_one_failed_symbol_does_not_affect_siblings() {
    let market = Arc::new(FakeMarket {
        failing_ratios: HashSet::from(["MSFT".to_string()]),
        ..FakeMarket::default()
    });
    let orch = orchestrator(Arc::clone(&market), Arc::new(MemoryCache::new()), 5);

    let result = orch.enrich(seed(&["AAPL", "MSFT", "NVDA"]), &CancellationToken::new()).await;

    let msft = result.records.iter().find(|r| r.symbol == "MSFT").unwrap();
    assert_eq!(msft.price_to_earnings, None);
    assert!(msft.one_year_return.is_some());
    let nvda = result.records.iter().find(|r| r.symbol == "NVDA").unwrap();
    assert_eq!(nvda.price_to_earnings, Some(25.0));

    let failures: Vec<_> = result.report.failures_for(Stage::Ratios).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].symbol.as_deref(), Some("MSFT"));
    assert_eq!(failures[0].kind, FailureKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_zero_price_and_unknown_symbols_keep_seeded_price() {
    let market = Arc::new(FakeMarket {
        zero_price: HashSet::from(["ZERO".to_string()]),
        unknown: HashSet::from(["GONE".to_string()]),
        ..FakeMarket::default()
    });
    let orch = orchestrator(market, Arc::new(MemoryCache::new()), 5);

    let result = orch.enrich(seed(&["ZERO", "GONE", "LIVE"]), &CancellationToken::new()).await;

    let price = |s: &str| result.records.iter().find(|r| r.symbol == s).map(|r| r.price);
    assert_eq!(price("ZERO"), Some(95.0));
    assert_eq!(price("GONE"), Some(95.0));
    assert_eq!(price("LIVE"), Some(110.0));
}

#[tokio::test]
async fn test_cache_hits_skip_providers() {
    let market = Arc::new(FakeMarket::default());
    let cache: Arc<dyn CachePort> = Arc::new(MemoryCache::new());
    let orch = orchestrator(Arc::clone(&market), Arc::clone(&cache), 5);

    let first = orch.enrich(seed(&["AAPL", "MSFT"]), &CancellationToken::new()).await;
    let second = orch.enrich(seed(&["AAPL", "MSFT"]), &CancellationToken::new()).await;

    assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), 1);
    assert_eq!(market.technicals_calls.load(Ordering::SeqCst), 2);
    assert_eq!(market.ratios_calls.load(Ordering::SeqCst), 2);
    assert_eq!(market.bars_calls.load(Ordering::SeqCst), 2);
    assert_eq!(first.records[0].price_to_earnings, second.records[0].price_to_earnings);
    assert_eq!(first.records[1].sparkline, second.records[1].sparkline);
}

#[tokio::test]
async fn test_broken_cache_degrades_to_misses() {
    let market = Arc::new(FakeMarket::default());
    let orch = orchestrator(Arc::clone(&market), Arc::new(BrokenCache), 5);

    let result = orch.enrich(seed(&["AAPL"]), &CancellationToken::new()).await;

    let record = &result.records[0];
    assert_eq!(record.price, 110.0);
    assert_eq!(record.roic, Some(18.0));
    assert!(record.sparkline.is_some());
    assert!(result.report.count_by_kind(FailureKind::CacheUnavailable) > 0);
    assert_eq!(result.report.count_by_kind(FailureKind::UpstreamUnavailable), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_per_stage() {
    let market = Arc::new(FakeMarket {
        delay_ms: 30,
        ..FakeMarket::default()
    });
    let orch = orchestrator(Arc::clone(&market), Arc::new(MemoryCache::new()), 2);
    let symbols: Vec<String> = (0..8).map(|i| format!("S{}", i)).collect();
    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();

    orch.enrich(seed(&refs), &CancellationToken::new()).await;

    // Each per-symbol stage saturates its own cap of 2 and never exceeds it
    assert_eq!(market.technicals_gauge.peak(), 2);
    assert_eq!(market.ratios_gauge.peak(), 2);
    assert_eq!(market.bars_gauge.peak(), 2);
    assert_eq!(market.ratios_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_in_flight_fetches() {
    let market = Arc::new(FakeMarket {
        delay_ms: 100,
        ..FakeMarket::default()
    });
    let orch = Arc::new(orchestrator(Arc::clone(&market), Arc::new(MemoryCache::new()), 5));

    let a = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.enrich(seed(&["AAPL", "MSFT"]), &CancellationToken::new()).await })
    };
    let b = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.enrich(seed(&["AAPL", "MSFT"]), &CancellationToken::new()).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(market.ratios_calls.load(Ordering::SeqCst), 2);
    assert_eq!(a.records[0].roic, b.records[0].roic);
}

#[tokio::test]
async fn test_cancellation_returns_promptly() {
    let market = Arc::new(FakeMarket {
        delay_ms: 10_000,
        ..FakeMarket::default()
    });
    let orch = orchestrator(market, Arc::new(MemoryCache::new()), 5);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = orch.enrich(seed(&["AAPL", "MSFT"]), &cancel).await;

    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    assert!(result.report.cancelled);
    assert_eq!(result.records.len(), 2);
    // Snapshot finished before the cancel, the slow stages did not
    assert_eq!(result.records[0].price, 110.0);
    assert_eq!(result.records[0].roic, None);
}
