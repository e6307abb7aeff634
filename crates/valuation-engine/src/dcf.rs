use analysis_core::stats::round2;
use analysis_core::DcfRecord;
use serde::{Deserialize, Serialize};

use crate::config::ValuationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcfClassification {
    #[serde(rename = "Undervalued")]
    Undervalued,
    #[serde(rename = "Fairly Valued")]
    FairlyValued,
    #[serde(rename = "Overvalued")]
    Overvalued,
}

impl DcfClassification {
    pub fn label(&self) -> &'static str {
        match self {
            DcfClassification::Undervalued => "Undervalued",
            DcfClassification::FairlyValued => "Fairly Valued",
            DcfClassification::Overvalued => "Overvalued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfAssessment {
    pub intrinsic_value: f64,
    pub price: f64,
    /// (intrinsic - price) / price, percent
    pub diff_percent: f64,
    /// Signed; negative when the price is above intrinsic value
    pub margin_of_safety: f64,
    pub classification: DcfClassification,
    /// Growth the market is pricing in: discount rate minus earnings yield
    pub implied_growth: Option<f64>,
}

/// Compare a DCF estimate with the price. `current_pe` feeds the
/// implied-growth estimate when positive.
pub fn assess_dcf(
    dcf: Option<&DcfRecord>,
    current_pe: Option<f64>,
    config: &ValuationConfig,
) -> Option<DcfAssessment> {
    let dcf = dcf?;
    if dcf.intrinsic_value <= 0.0 || dcf.price <= 0.0 {
        return None;
    }

    let diff_percent = round2((dcf.intrinsic_value - dcf.price) / dcf.price * 100.0);
    let classification = if diff_percent > config.fair_band_percent {
        DcfClassification::Undervalued
    } else if diff_percent < -config.fair_band_percent {
        DcfClassification::Overvalued
    } else {
        DcfClassification::FairlyValued
    };
    let implied_growth = current_pe
        .filter(|pe| *pe > 0.0)
        .map(|pe| config.discount_rate - 1.0 / pe);

    Some(DcfAssessment {
        intrinsic_value: dcf.intrinsic_value,
        price: dcf.price,
        diff_percent,
        margin_of_safety: diff_percent,
        classification,
        implied_growth,
    })
}
