//! overview-cli: sector overviews and valuation deep-dives from Polygon data.
//!
//! Usage:
//!   cargo run -p overview-cli -- --symbols AAPL MSFT NVDA --sector Technology --sort 1y
//!   cargo run -p overview-cli -- --valuation AAPL --sector Technology
//!   cargo run -p overview-cli -- --sectors
//!
//! Output is JSON on stdout. Set REDIS_URL to share the cache between runs.

use analysis_core::{BaseRecord, CachePort};
use enrichment_orchestrator::{CancellationToken, EnrichmentOrchestrator, Providers};
use futures_util::future::join_all;
use market_cache::{MemoryCache, RedisCache};
use overview_service::{
    OverviewRequest, OverviewService, ServiceConfig, ValuationProviders, ValuationService,
};
use polygon_client::PolygonClient;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Concurrent ticker-detail lookups when seeding records
const SEED_CONCURRENCY: usize = 5;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Values following `flag` up to the next `--` option
fn flag_values(args: &[String], flag: &str) -> Vec<String> {
    args.iter()
        .position(|a| a == flag)
        .map(|idx| {
            args[idx + 1..]
                .iter()
                .take_while(|a| !a.starts_with("--"))
                .map(|s| s.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "overview_cli=info,overview_service=info,enrichment_orchestrator=info,polygon_client=warn".into()
            }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = ServiceConfig::from_env()?;

    if args.iter().any(|a| a == "--sectors") {
        println!("{}", serde_json::to_string_pretty(&config.sectors.names())?);
        return Ok(());
    }

    let api_key = std::env::var("POLYGON_API_KEY")
        .map_err(|_| anyhow::anyhow!("POLYGON_API_KEY must be set"))?;
    let polygon = Arc::new(PolygonClient::new(api_key));

    let cache: Arc<dyn CachePort> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => {
                tracing::info!("Using Redis cache");
                Arc::new(redis)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-process cache", e);
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling in-flight work");
                cancel.cancel();
            }
        });
    }

    let orchestrator = Arc::new(EnrichmentOrchestrator::new(
        Providers::from_shared(Arc::clone(&polygon)),
        Arc::clone(&cache),
        config.enrichment.clone(),
    ));
    let sectors = Arc::new(config.sectors.clone());
    let sector = flag_value(&args, "--sector");

    if let Some(symbol) = flag_value(&args, "--valuation") {
        let service = ValuationService::new(
            ValuationProviders::from_shared(Arc::clone(&polygon)),
            Arc::clone(&cache),
            orchestrator.ratios_deduplicator(),
            sectors,
            config.valuation.clone(),
        )
        .with_concurrency(config.enrichment.concurrency)
        .with_max_peers(config.max_peers);

        let report = service.valuation(symbol, sector, &cancel).await?;
        for failure in &report.failures {
            tracing::warn!("{} unavailable: {}", failure.source, failure.message);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let symbols = flag_values(&args, "--symbols");
    if symbols.is_empty() {
        anyhow::bail!("nothing to do: pass --symbols, --valuation or --sectors");
    }

    tracing::info!("Seeding {} symbols from ticker details...", symbols.len());
    let base_records = seed_records(&polygon, &symbols).await;

    let mut request = OverviewRequest::new(symbols, base_records)
        .with_sort_name(flag_value(&args, "--sort").unwrap_or("market_cap"));
    if let Some(name) = sector {
        request = request.with_sector(name);
    }

    let service = OverviewService::new(orchestrator, cache, sectors);
    let overview = service.build_overview(request, &cancel).await?;
    if !overview.report.is_clean() {
        tracing::warn!(
            "{} stage failures during enrichment",
            overview.report.failures.len()
        );
    }
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(())
}

/// Names and market caps from ticker details. Lookups that fail leave the
/// symbol to be seeded with a bare record.
async fn seed_records(polygon: &PolygonClient, symbols: &[String]) -> Vec<BaseRecord> {
    let semaphore = Semaphore::new(SEED_CONCURRENCY);
    let details = join_all(symbols.iter().map(|symbol| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.ok()?;
            match polygon.get_ticker_details(symbol).await {
                Ok(Some(details)) => Some(BaseRecord {
                    symbol: symbol.clone(),
                    name: details.name,
                    logo_url: None,
                    price: 0.0,
                    market_cap: details.market_cap.unwrap_or(0.0),
                }),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!("{}: ticker details unavailable: {}", symbol, e);
                    None
                }
            }
        }
    }))
    .await;
    details.into_iter().flatten().collect()
}
