use analysis_core::{
    get_json, set_json, AnalysisError, Bar, BarsProvider, CachePort, DataType, EnrichedRecord,
    FailureKind, FundamentalRatios, PriceSnapshot, RatiosProvider, SnapshotProvider,
    TechnicalSignals, TechnicalsProvider,
};
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dedup::Deduplicator;
use crate::record_set::RecordSet;
use crate::report::{EnrichmentReport, Stage, StageFailure};

/// Tuning for one orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentConfig {
    /// In-flight provider calls per per-symbol stage
    pub concurrency: usize,
    /// Days of daily bars behind returns, range and sparkline
    pub history_days: i64,
    pub sparkline_points: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            history_days: 365,
            sparkline_points: 30,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl EnrichmentConfig {
    /// Defaults overridden by `ENRICH_CONCURRENCY`, `ENRICH_HISTORY_DAYS`
    /// and `ENRICH_SPARKLINE_POINTS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse::<usize>("ENRICH_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            history_days: env_parse::<i64>("ENRICH_HISTORY_DAYS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_days),
            sparkline_points: env_parse("ENRICH_SPARKLINE_POINTS").unwrap_or(defaults.sparkline_points),
        }
    }
}

/// The upstream data domains the orchestrator fans out to
#[derive(Clone)]
pub struct Providers {
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub technicals: Arc<dyn TechnicalsProvider>,
    pub ratios: Arc<dyn RatiosProvider>,
    pub bars: Arc<dyn BarsProvider>,
}

impl Providers {
    /// All four domains served by one client
    pub fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: SnapshotProvider + TechnicalsProvider + RatiosProvider + BarsProvider + 'static,
    {
        Self {
            snapshots: provider.clone(),
            technicals: provider.clone(),
            ratios: provider.clone(),
            bars: provider,
        }
    }
}

/// Result of one enrichment run
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub records: Vec<EnrichedRecord>,
    pub report: EnrichmentReport,
}

/// Shared state of one run, borrowed by every stage
struct Run<'a> {
    set: &'a Arc<RecordSet>,
    cancel: &'a CancellationToken,
}

/// Identity of a per-symbol stage
struct StageSpec {
    stage: Stage,
    data_type: DataType,
    /// Appended to the symbol to form cache and dedup keys
    key_suffix: String,
}

pub struct EnrichmentOrchestrator {
    providers: Providers,
    cache: Arc<dyn CachePort>,
    config: EnrichmentConfig,
    technicals_dedup: Arc<Deduplicator<Option<TechnicalSignals>>>,
    ratios_dedup: Arc<Deduplicator<Option<FundamentalRatios>>>,
    bars_dedup: Arc<Deduplicator<Vec<Bar>>>,
}

impl EnrichmentOrchestrator {
    pub fn new(providers: Providers, cache: Arc<dyn CachePort>, config: EnrichmentConfig) -> Self {
        Self {
            providers,
            cache,
            config,
            technicals_dedup: Arc::new(Deduplicator::new("technicals")),
            ratios_dedup: Arc::new(Deduplicator::new("ratios")),
            bars_dedup: Arc::new(Deduplicator::new("price_history")),
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Ratios deduplicator, shared with other callers fetching current ratios
    pub fn ratios_deduplicator(&self) -> Arc<Deduplicator<Option<FundamentalRatios>>> {
        Arc::clone(&self.ratios_dedup)
    }

    /// Run every stage over `records` and wait for all of them.
    ///
    /// Stage failures leave the affected fields `None` and are listed in the
    /// report. Cancellation stops outstanding work; whatever was written
    /// before that is returned.
    pub async fn enrich(&self, records: Vec<EnrichedRecord>, cancel: &CancellationToken) -> Enrichment {
        let started = Instant::now();
        let set = Arc::new(RecordSet::new(records));
        let symbols: Vec<String> = set.symbols().to_vec();
        tracing::info!(
            "Enriching {} symbols (concurrency {})",
            symbols.len(),
            self.config.concurrency
        );

        let run = Run { set: &set, cancel };
        let (snapshot, technicals, ratios, history) = tokio::join!(
            self.snapshot_stage(&run, &symbols),
            self.technicals_stage(&run, &symbols),
            self.ratios_stage(&run, &symbols),
            self.history_stage(&run, &symbols),
        );

        let mut failures: Vec<StageFailure> = [snapshot, technicals, ratios, history]
            .into_iter()
            .flatten()
            .collect();
        failures.retain(|f| f.kind != FailureKind::Cancelled);
        let cancelled = cancel.is_cancelled();

        let records = match Arc::try_unwrap(set) {
            Ok(set) => set.into_records(),
            Err(shared) => shared.snapshot().await,
        };
        let report = EnrichmentReport {
            failures,
            cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if cancelled {
            tracing::warn!("Enrichment cancelled after {}ms", report.elapsed_ms);
        } else {
            tracing::info!(
                "Enrichment finished: {} symbols, {} failures in {}ms",
                records.len(),
                report.failures.len(),
                report.elapsed_ms
            );
        }

        Enrichment { records, report }
    }

    /// One batch call for every symbol not already cached.
    async fn snapshot_stage(&self, run: &Run<'_>, symbols: &[String]) -> Vec<StageFailure> {
        tokio::select! {
            biased;
            _ = run.cancel.cancelled() => Vec::new(),
            failures = self.snapshot_batch(run, symbols) => failures,
        }
    }

    async fn snapshot_batch(&self, run: &Run<'_>, symbols: &[String]) -> Vec<StageFailure> {
        let mut failures = Vec::new();
        let mut snapshots: Vec<PriceSnapshot> = Vec::with_capacity(symbols.len());
        let mut misses = Vec::new();

        for symbol in symbols {
            match get_json::<PriceSnapshot>(self.cache.as_ref(), DataType::Snapshot, symbol).await {
                Ok(Some(hit)) => snapshots.push(hit),
                Ok(None) => misses.push(symbol.clone()),
                Err(e) => {
                    tracing::warn!("Snapshot cache read failed for {}: {}", symbol, e);
                    failures.push(StageFailure::cache(Stage::Snapshot, symbol, &e));
                    misses.push(symbol.clone());
                }
            }
        }

        if !misses.is_empty() {
            match self.providers.snapshots.fetch_snapshots(&misses).await {
                Ok(fetched) => {
                    tracing::debug!("Snapshot batch: {} requested, {} returned", misses.len(), fetched.len());
                    for snapshot in fetched {
                        if snapshot.price > 0.0 {
                            if let Err(e) = set_json(self.cache.as_ref(), DataType::Snapshot, &snapshot.symbol, &snapshot).await {
                                tracing::warn!("Snapshot cache write failed for {}: {}", snapshot.symbol, e);
                                failures.push(StageFailure::cache(Stage::Snapshot, &snapshot.symbol, &e));
                            }
                        }
                        snapshots.push(snapshot);
                    }
                }
                Err(e) => {
                    tracing::warn!("Snapshot batch for {} symbols failed: {}", misses.len(), e);
                    failures.push(StageFailure::new(Stage::Snapshot, None, &e));
                }
            }
        }

        for snapshot in snapshots {
            // Symbols missing from the batch keep their seeded values
            run.set
                .update(&snapshot.symbol, |record| {
                    if snapshot.price > 0.0 {
                        record.price = snapshot.price;
                    }
                    if let Some(cap) = snapshot.market_cap.filter(|c| *c > 0.0) {
                        record.market_cap = cap;
                    }
                })
                .await;
        }

        failures
    }

    async fn technicals_stage(&self, run: &Run<'_>, symbols: &[String]) -> Vec<StageFailure> {
        let provider = Arc::clone(&self.providers.technicals);
        let fetch = move |symbol: String, reference_price: f64| {
            let provider = Arc::clone(&provider);
            async move { provider.fetch_technicals(&symbol, reference_price).await }
        };
        let apply = |record: &mut EnrichedRecord, signals: &Option<TechnicalSignals>| {
            let Some(signals) = signals else {
                return;
            };
            // Re-evaluate against the latest known price; fall back to the provider's flags
            let current = TechnicalSignals::from_averages(
                record.price,
                signals.sma_20,
                signals.sma_50,
                signals.sma_200,
            );
            record.above_sma_20 = current.above_sma_20.or(signals.above_sma_20);
            record.above_sma_50 = current.above_sma_50.or(signals.above_sma_50);
            record.above_sma_200 = current.above_sma_200.or(signals.above_sma_200);
        };

        let spec = StageSpec {
            stage: Stage::Technicals,
            data_type: DataType::Technicals,
            key_suffix: String::new(),
        };
        self.per_symbol_stage(run, symbols, spec, Arc::clone(&self.technicals_dedup), fetch, apply)
            .await
    }

    async fn ratios_stage(&self, run: &Run<'_>, symbols: &[String]) -> Vec<StageFailure> {
        let provider = Arc::clone(&self.providers.ratios);
        let fetch = move |symbol: String, _reference_price: f64| {
            let provider = Arc::clone(&provider);
            async move { provider.fetch_ratios(&symbol).await }
        };
        let apply = |record: &mut EnrichedRecord, ratios: &Option<FundamentalRatios>| {
            if let Some(ratios) = ratios {
                record.price_to_sales = ratios.price_to_sales;
                record.price_to_earnings = ratios.price_to_earnings;
                record.roic = ratios.roic;
            }
        };

        let spec = StageSpec {
            stage: Stage::Ratios,
            data_type: DataType::Ratios,
            key_suffix: String::new(),
        };
        self.per_symbol_stage(run, symbols, spec, Arc::clone(&self.ratios_dedup), fetch, apply)
            .await
    }

    async fn history_stage(&self, run: &Run<'_>, symbols: &[String]) -> Vec<StageFailure> {
        let provider = Arc::clone(&self.providers.bars);
        let to = Utc::now();
        let from = to - Duration::days(self.config.history_days);
        let fetch = move |symbol: String, _reference_price: f64| {
            let provider = Arc::clone(&provider);
            async move { provider.fetch_bars(&symbol, from, to).await }
        };

        let sparkline_points = self.config.sparkline_points;
        let apply = move |record: &mut EnrichedRecord, bars: &Vec<Bar>| {
            if bars.is_empty() {
                return;
            }
            let returns = analytics::compute_returns(bars, Utc::now());
            let range = analytics::price_range(bars);
            record.ytd_return = returns.ytd;
            record.one_month_return = returns.one_month;
            record.one_year_return = returns.one_year;
            record.high_52w = range.high;
            record.low_52w = range.low;
            record.sparkline = Some(analytics::sparkline(bars, sparkline_points));
            record.chart = Some(analytics::chart_series(bars));
        };

        let spec = StageSpec {
            stage: Stage::PriceHistory,
            data_type: DataType::PriceHistory,
            key_suffix: format!(":{}d", self.config.history_days),
        };
        self.per_symbol_stage(run, symbols, spec, Arc::clone(&self.bars_dedup), fetch, apply)
            .await
    }

    /// Bounded fan-out of one task per symbol: cache, then the deduplicated
    /// provider call, then a best-effort cache fill and the record write.
    async fn per_symbol_stage<T, F, Fut, A>(
        &self,
        run: &Run<'_>,
        symbols: &[String],
        spec: StageSpec,
        dedup: Arc<Deduplicator<T>>,
        fetch: F,
        apply: A,
    ) -> Vec<StageFailure>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(String, f64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AnalysisError>> + Send + 'static,
        A: Fn(&mut EnrichedRecord, &T) + Send + Sync + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let fetch = Arc::new(fetch);
        let apply = Arc::new(apply);
        let StageSpec { stage, data_type, key_suffix } = spec;
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let symbol = symbol.clone();
            let key = format!("{}{}", symbol, key_suffix);
            let semaphore = Arc::clone(&semaphore);
            let cache = Arc::clone(&self.cache);
            let set = Arc::clone(run.set);
            let cancel = run.cancel.clone();
            let dedup = Arc::clone(&dedup);
            let fetch = Arc::clone(&fetch);
            let apply = Arc::clone(&apply);

            tasks.spawn(async move {
                let work = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| AnalysisError::Unknown(e.to_string()))?;
                    let mut failures = Vec::new();

                    let cached = match get_json::<T>(cache.as_ref(), data_type, &key).await {
                        Ok(hit) => hit,
                        Err(e) => {
                            tracing::warn!("{} cache read failed for {}: {}", stage, symbol, e);
                            failures.push(StageFailure::cache(stage, &symbol, &e));
                            None
                        }
                    };

                    let value = match cached {
                        Some(hit) => hit,
                        None => {
                            let reference_price = set.price_of(&symbol).await.unwrap_or(0.0);
                            let fresh = dedup.run(&key, || fetch(symbol.clone(), reference_price)).await?;
                            if let Err(e) = set_json(cache.as_ref(), data_type, &key, &fresh).await {
                                tracing::warn!("{} cache write failed for {}: {}", stage, symbol, e);
                                failures.push(StageFailure::cache(stage, &symbol, &e));
                            }
                            fresh
                        }
                    };

                    set.update(&symbol, |record| apply(record, &value)).await;
                    Ok::<_, AnalysisError>(failures)
                };

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
                    result = work => result,
                };
                match outcome {
                    Ok(failures) => failures,
                    Err(e) => {
                        tracing::debug!("{} failed for {}: {}", stage, symbol, e);
                        vec![StageFailure::new(stage, Some(&symbol), &e)]
                    }
                }
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(task_failures) => failures.extend(task_failures),
                Err(e) => {
                    tracing::warn!("{} task panicked: {}", stage, e);
                    failures.push(StageFailure::new(stage, None, &AnalysisError::Unknown(e.to_string())));
                }
            }
        }
        if !failures.is_empty() {
            tracing::warn!("{} stage: {} of {} symbols degraded", stage, failures.len(), symbols.len());
        }
        failures
    }
}
