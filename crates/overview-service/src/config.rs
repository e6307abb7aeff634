use anyhow::Context;
use enrichment_orchestrator::EnrichmentConfig;
use std::str::FromStr;
use valuation_engine::ValuationConfig;

use crate::sectors::SectorCatalog;

/// Everything the services need, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub enrichment: EnrichmentConfig,
    pub valuation: ValuationConfig,
    pub sectors: SectorCatalog,
    /// Redis connection string; the in-process cache is used when unset
    pub redis_url: Option<String>,
    /// Peers scored per valuation request
    pub max_peers: usize,
}

fn env_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {}: '{}'", name, raw)),
        _ => Ok(None),
    }
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut valuation = ValuationConfig::default();
        if let Some(scale) = env_var::<f64>("VALUATION_CURVE_SCALE")? {
            anyhow::ensure!(scale > 0.0, "VALUATION_CURVE_SCALE must be positive");
            valuation.curve.scale = scale;
        }
        if let Some(rate) = env_var::<f64>("VALUATION_DISCOUNT_RATE")? {
            valuation.discount_rate = rate;
        }
        if let Some(band) = env_var::<f64>("VALUATION_FAIR_BAND")? {
            valuation.fair_band_percent = band;
        }

        let sectors = match std::env::var("SECTOR_CATALOG_PATH") {
            Ok(path) if !path.trim().is_empty() => SectorCatalog::from_json_file(path.trim())?,
            _ => SectorCatalog::builtin(),
        };

        Ok(Self {
            enrichment: EnrichmentConfig::from_env(),
            valuation,
            sectors,
            redis_url: std::env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
            max_peers: env_var::<usize>("VALUATION_MAX_PEERS")?.unwrap_or(10),
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enrichment: EnrichmentConfig::default(),
            valuation: ValuationConfig::default(),
            sectors: SectorCatalog::builtin(),
            redis_url: None,
            max_peers: 10,
        }
    }
}
