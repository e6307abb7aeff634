use analysis_core::{AnalysisError, EnrichedRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Field a record set can be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    PctFromHigh,
    YtdReturn,
    OneMonthReturn,
    OneYearReturn,
    #[default]
    MarketCap,
    RsRank,
    Roic,
    PriceToSales,
    PriceToEarnings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortField {
    /// Multiples sort cheapest first; everything else highest first.
    pub fn direction(&self) -> SortDirection {
        match self {
            SortField::PriceToSales | SortField::PriceToEarnings => SortDirection::Ascending,
            _ => SortDirection::Descending,
        }
    }

    fn value(&self, record: &EnrichedRecord) -> Option<f64> {
        match self {
            SortField::PctFromHigh => record.pct_from_high,
            SortField::YtdReturn => record.ytd_return,
            SortField::OneMonthReturn => record.one_month_return,
            SortField::OneYearReturn => record.one_year_return,
            SortField::MarketCap => Some(record.market_cap),
            SortField::RsRank => record.rs_rank.map(f64::from),
            SortField::Roic => record.roic,
            SortField::PriceToSales => record.price_to_sales,
            SortField::PriceToEarnings => record.price_to_earnings,
        }
    }

    /// Parse a request value, falling back to market cap for unknown names.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for SortField {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pct_from_high" | "distance_to_high" | "high_52w" => Ok(SortField::PctFromHigh),
            "ytd" | "ytd_return" => Ok(SortField::YtdReturn),
            "1m" | "one_month" | "one_month_return" => Ok(SortField::OneMonthReturn),
            "1y" | "one_year" | "one_year_return" => Ok(SortField::OneYearReturn),
            "market_cap" | "marketcap" => Ok(SortField::MarketCap),
            "rs_rank" | "rs" => Ok(SortField::RsRank),
            "roic" => Ok(SortField::Roic),
            "ps" | "price_to_sales" => Ok(SortField::PriceToSales),
            "pe" | "price_to_earnings" => Ok(SortField::PriceToEarnings),
            other => Err(AnalysisError::InvalidData(format!("unknown sort field '{}'", other))),
        }
    }
}

/// Stable sort by `field`. Records missing the field are not dropped: they
/// take a sentinel at the far end of the ordering so they trail the rest.
pub fn sort_records(records: &mut [EnrichedRecord], field: SortField) {
    match field.direction() {
        SortDirection::Descending => records.sort_by(|a, b| {
            let a = field.value(a).unwrap_or(f64::MIN);
            let b = field.value(b).unwrap_or(f64::MIN);
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        }),
        SortDirection::Ascending => records.sort_by(|a, b| {
            let a = field.value(a).unwrap_or(f64::MAX);
            let b = field.value(b).unwrap_or(f64::MAX);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }),
    }
}
