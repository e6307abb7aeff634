use analysis_core::{
    get_json, set_json, AnalysisError, CachePort, DataType, DcfProvider, DcfRecord, FailureKind,
    FundamentalRatios, PeerRatio, PeersProvider, QuarterlyRatio, RatiosProvider,
};
use chrono::{DateTime, Utc};
use enrichment_orchestrator::Deduplicator;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use valuation_engine::{score_valuation, ValuationConfig, ValuationResult};

use crate::sectors::SectorCatalog;

/// The upstream sources a valuation draws on
#[derive(Clone)]
pub struct ValuationProviders {
    pub ratios: Arc<dyn RatiosProvider>,
    pub peers: Arc<dyn PeersProvider>,
    pub dcf: Arc<dyn DcfProvider>,
}

impl ValuationProviders {
    pub fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: RatiosProvider + PeersProvider + DcfProvider + 'static,
    {
        Self {
            ratios: provider.clone(),
            peers: provider.clone(),
            dcf: provider,
        }
    }
}

/// A source that could not be read; its inputs were treated as absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub symbol: String,
    pub sector: Option<String>,
    pub peers: Vec<String>,
    pub valuation: ValuationResult,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub failures: Vec<SourceFailure>,
}

pub struct ValuationService {
    providers: ValuationProviders,
    cache: Arc<dyn CachePort>,
    ratios_dedup: Arc<Deduplicator<Option<FundamentalRatios>>>,
    sectors: Arc<SectorCatalog>,
    config: ValuationConfig,
    concurrency: usize,
    max_peers: usize,
}

impl ValuationService {
    pub fn new(
        providers: ValuationProviders,
        cache: Arc<dyn CachePort>,
        ratios_dedup: Arc<Deduplicator<Option<FundamentalRatios>>>,
        sectors: Arc<SectorCatalog>,
        config: ValuationConfig,
    ) -> Self {
        Self {
            providers,
            cache,
            ratios_dedup,
            sectors,
            config,
            concurrency: 5,
            max_peers: 10,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Valuation deep-dive for one symbol, cache-first.
    ///
    /// Sources that fail are reported and scored as absent. Only clean
    /// results are cached.
    pub async fn valuation(
        &self,
        symbol: &str,
        sector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ValuationReport, AnalysisError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(AnalysisError::InvalidData("empty symbol".to_string()));
        }
        let sector = match sector {
            Some(name) => Some(self.sectors.validate(name)?.name.clone()),
            None => None,
        };
        let cache_key = match &sector {
            Some(name) => format!("{}:{}", symbol, name.to_ascii_lowercase()),
            None => symbol.clone(),
        };

        match get_json::<ValuationReport>(self.cache.as_ref(), DataType::Valuation, &cache_key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!("Valuation cache read failed for {}: {}", cache_key, e),
        }

        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            report = self.compute(&symbol, sector) => report,
        };

        if report.failures.is_empty() {
            if let Err(e) = set_json(self.cache.as_ref(), DataType::Valuation, &cache_key, &report).await {
                tracing::warn!("Valuation cache write failed for {}: {}", cache_key, e);
            }
        } else {
            tracing::warn!("{}: valuation degraded, {} sources unavailable", symbol, report.failures.len());
        }
        Ok(report)
    }

    async fn compute(&self, symbol: &str, sector: Option<String>) -> ValuationReport {
        let quarters = self.config.history_quarters;
        // Keyed by window size
        let history_key = format!("{}:{}q", symbol, quarters);
        let (current, history, peers, dcf) = tokio::join!(
            self.current_ratios(symbol),
            self.cached("ratio_history", DataType::RatioHistory, &history_key, || {
                let provider = Arc::clone(&self.providers.ratios);
                let symbol = symbol.to_string();
                async move { provider.fetch_ratio_history(&symbol, quarters).await }
            }),
            self.peer_ratios(symbol),
            self.cached("dcf", DataType::Dcf, symbol, || {
                let provider = Arc::clone(&self.providers.dcf);
                let symbol = symbol.to_string();
                async move { provider.fetch_dcf(&symbol).await }
            }),
        );

        let mut failures = Vec::new();
        let mut absorb = |source: &str, error: AnalysisError| {
            tracing::debug!("{}: {} unavailable: {}", symbol, source, error);
            failures.push(SourceFailure {
                source: source.to_string(),
                kind: error.failure_kind(),
                message: error.to_string(),
            });
        };

        let current = current.unwrap_or_else(|e| {
            absorb("ratios", e);
            None
        });
        let history: Vec<QuarterlyRatio> = history.unwrap_or_else(|e| {
            absorb("ratio_history", e);
            Vec::new()
        });
        let (peer_symbols, peer_ratios) = peers.unwrap_or_else(|e| {
            absorb("peers", e);
            (Vec::new(), Vec::new())
        });
        let dcf: Option<DcfRecord> = dcf.unwrap_or_else(|e| {
            absorb("dcf", e);
            None
        });

        let benchmark = sector.as_deref().and_then(|s| self.sectors.benchmark(s));
        let valuation = score_valuation(
            &current.unwrap_or_default(),
            &history,
            &peer_ratios,
            dcf.as_ref(),
            benchmark,
            &self.config,
        );

        ValuationReport {
            symbol: symbol.to_string(),
            sector,
            peers: peer_symbols,
            valuation,
            generated_at: Utc::now(),
            failures,
        }
    }

    /// Current ratios through the cache and the shared deduplicator
    async fn current_ratios(&self, symbol: &str) -> Result<Option<FundamentalRatios>, AnalysisError> {
        if let Some(hit) = self.read::<Option<FundamentalRatios>>(DataType::Ratios, symbol).await {
            return Ok(hit);
        }
        let provider = Arc::clone(&self.providers.ratios);
        let owned = symbol.to_string();
        let fresh = self
            .ratios_dedup
            .run(symbol, || async move { provider.fetch_ratios(&owned).await })
            .await?;
        self.write(DataType::Ratios, symbol, &fresh).await;
        Ok(fresh)
    }

    /// Peer list, then current ratios for each peer under the concurrency cap.
    /// Peers whose ratios fail are left out.
    async fn peer_ratios(&self, symbol: &str) -> Result<(Vec<String>, Vec<PeerRatio>), AnalysisError> {
        let mut peers: Vec<String> = self
            .cached("peers", DataType::Peers, symbol, || {
                let provider = Arc::clone(&self.providers.peers);
                let symbol = symbol.to_string();
                async move { provider.fetch_peers(&symbol).await }
            })
            .await?;
        peers.retain(|p| !p.eq_ignore_ascii_case(symbol));
        peers.truncate(self.max_peers);

        let semaphore = Semaphore::new(self.concurrency);
        let fetched = join_all(peers.iter().map(|peer| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.current_ratios(peer).await {
                    Ok(Some(ratios)) => Some(PeerRatio {
                        symbol: peer.clone(),
                        ratios,
                    }),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!("Peer {} ratios unavailable: {}", peer, e);
                        None
                    }
                }
            }
        }))
        .await;

        Ok((peers, fetched.into_iter().flatten().collect()))
    }

    /// Cache-first fetch for a single-symbol source
    async fn cached<T, F, Fut>(
        &self,
        source: &str,
        data_type: DataType,
        key: &str,
        fetch: F,
    ) -> Result<T, AnalysisError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        if let Some(hit) = self.read::<T>(data_type, key).await {
            return Ok(hit);
        }
        tracing::debug!("{}: fetching {}", key, source);
        let fresh = fetch().await?;
        self.write(data_type, key, &fresh).await;
        Ok(fresh)
    }

    async fn read<T: DeserializeOwned>(&self, data_type: DataType, key: &str) -> Option<T> {
        match get_json::<T>(self.cache.as_ref(), data_type, key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("{} cache read failed for {}: {}", data_type, key, e);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, data_type: DataType, key: &str, value: &T) {
        if let Err(e) = set_json(self.cache.as_ref(), data_type, key, value).await {
            tracing::warn!("{} cache write failed for {}: {}", data_type, key, e);
        }
    }
}
