use analysis_core::{AnalysisError, FundamentalRatios};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One sector and the benchmark medians its members are compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    #[serde(default)]
    pub benchmark: FundamentalRatios,
}

/// Valid sector names and their benchmark medians. Built once and injected
/// into the services; lookups ignore case.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorCatalog {
    sectors: HashMap<String, Sector>,
}

fn benchmark(pe: f64, ps: f64, pb: f64, ev_ebitda: f64, pfcf: f64) -> FundamentalRatios {
    FundamentalRatios {
        price_to_earnings: Some(pe),
        price_to_sales: Some(ps),
        price_to_book: Some(pb),
        ev_to_ebitda: Some(ev_ebitda),
        price_to_fcf: Some(pfcf),
        ..Default::default()
    }
}

impl SectorCatalog {
    pub fn new(sectors: Vec<Sector>) -> Self {
        Self {
            sectors: sectors
                .into_iter()
                .map(|s| (s.name.to_ascii_lowercase(), s))
                .collect(),
        }
    }

    /// The 11 GICS sectors with long-run median multiples
    pub fn builtin() -> Self {
        let sector = |name: &str, benchmark: FundamentalRatios| Sector {
            name: name.to_string(),
            benchmark,
        };
        Self::new(vec![
            sector("Technology", benchmark(28.0, 6.5, 7.5, 20.0, 30.0)),
            sector("Healthcare", benchmark(22.0, 4.0, 4.5, 15.0, 22.0)),
            sector("Financials", benchmark(14.0, 2.8, 1.5, 10.0, 12.0)),
            sector("Energy", benchmark(12.0, 1.3, 1.9, 6.0, 9.0)),
            sector("Consumer Discretionary", benchmark(24.0, 2.0, 6.0, 14.0, 25.0)),
            sector("Consumer Staples", benchmark(21.0, 1.6, 5.0, 14.0, 24.0)),
            sector("Industrials", benchmark(21.0, 2.2, 4.8, 14.0, 23.0)),
            sector("Materials", benchmark(17.0, 1.9, 2.6, 10.0, 18.0)),
            sector("Utilities", benchmark(18.0, 2.4, 1.9, 11.0, 25.0)),
            sector("Real Estate", benchmark(35.0, 7.0, 2.3, 19.0, 22.0)),
            sector("Communication Services", benchmark(20.0, 3.2, 3.4, 11.0, 20.0)),
        ])
    }

    /// Load a catalog from a JSON array of sectors
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sector catalog {}", path.display()))?;
        let sectors: Vec<Sector> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing sector catalog {}", path.display()))?;
        anyhow::ensure!(!sectors.is_empty(), "sector catalog {} is empty", path.display());
        Ok(Self::new(sectors))
    }

    pub fn get(&self, name: &str) -> Option<&Sector> {
        self.sectors.get(&name.trim().to_ascii_lowercase())
    }

    /// Unknown sector names are a caller error
    pub fn validate(&self, name: &str) -> Result<&Sector, AnalysisError> {
        self.get(name)
            .ok_or_else(|| AnalysisError::InvalidData(format!("unknown sector '{}'", name)))
    }

    pub fn benchmark(&self, name: &str) -> Option<&FundamentalRatios> {
        self.get(name).map(|s| &s.benchmark)
    }

    /// Sector names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sectors.values().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}

impl Default for SectorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_gics() {
        let catalog = SectorCatalog::builtin();
        assert_eq!(catalog.len(), 11);
        assert!(catalog.get("technology").is_some());
        assert!(catalog.get("  Real Estate ").is_some());
        assert_eq!(catalog.benchmark("Energy").and_then(|b| b.price_to_earnings), Some(12.0));
    }

    #[test]
    fn test_validate_unknown_sector() {
        let catalog = SectorCatalog::builtin();
        let err = catalog.validate("Crypto").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }

    #[test]
    fn test_load_from_json() {
        let path = std::env::temp_dir().join(format!("sectors-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"name": "Semiconductors", "benchmark": {"price_to_earnings": 30.0}}, {"name": "Banks"}]"#,
        )
        .unwrap();

        let catalog = SectorCatalog::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(catalog.names(), vec!["Banks", "Semiconductors"]);
        assert_eq!(
            catalog.benchmark("semiconductors").and_then(|b| b.price_to_earnings),
            Some(30.0)
        );
        assert_eq!(catalog.benchmark("banks"), Some(&FundamentalRatios::default()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(SectorCatalog::from_json_file("/nonexistent/sectors.json").is_err());
    }
}
