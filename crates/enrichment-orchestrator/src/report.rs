use analysis_core::{AnalysisError, FailureKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One data-domain fetch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Snapshot,
    Technicals,
    Ratios,
    PriceHistory,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Snapshot => "snapshot",
            Stage::Technicals => "technicals",
            Stage::Ratios => "ratios",
            Stage::PriceHistory => "price_history",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A degraded field group: which stage, which symbol (none for batch-wide
/// failures) and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub symbol: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, symbol: Option<&str>, error: &AnalysisError) -> Self {
        Self {
            stage,
            symbol: symbol.map(str::to_string),
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }

    pub fn cache(stage: Stage, symbol: &str, error: &AnalysisError) -> Self {
        Self {
            stage,
            symbol: Some(symbol.to_string()),
            kind: FailureKind::CacheUnavailable,
            message: error.to_string(),
        }
    }
}

/// Everything that went wrong during one enrichment run. Failures never stop
/// a run; they only explain which fields ended up absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub failures: Vec<StageFailure>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl EnrichmentReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn failures_for(&self, stage: Stage) -> impl Iterator<Item = &StageFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    pub fn count_by_kind(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }
}
