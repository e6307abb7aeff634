use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// One point of a chart series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl From<&Bar> for PricePoint {
    fn from(bar: &Bar) -> Self {
        Self {
            date: bar.timestamp.date_naive(),
            close: bar.close,
        }
    }
}

/// Seed record for one instrument, known before enrichment starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub price: f64,
    pub market_cap: f64,
}

/// A base record plus every derived field. Derived fields stay `None` until
/// the stage that owns them completes; a stage failure leaves them `None`
/// for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub symbol: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub price: f64,
    pub market_cap: f64,

    // Valuation multiples
    pub price_to_sales: Option<f64>,
    pub price_to_earnings: Option<f64>,
    pub roic: Option<f64>,

    // Trend flags
    pub above_sma_20: Option<bool>,
    pub above_sma_50: Option<bool>,
    pub above_sma_200: Option<bool>,

    // Returns, in percent
    pub ytd_return: Option<f64>,
    pub one_month_return: Option<f64>,
    pub one_year_return: Option<f64>,

    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    /// Percent below the 52-week high (zero or negative).
    pub pct_from_high: Option<f64>,
    /// Relative-strength rank, 1 (weakest) to 99 (strongest).
    pub rs_rank: Option<u8>,

    pub sparkline: Option<Vec<f64>>,
    pub chart: Option<Vec<PricePoint>>,
}

impl From<BaseRecord> for EnrichedRecord {
    fn from(base: BaseRecord) -> Self {
        Self {
            symbol: base.symbol,
            name: base.name,
            logo_url: base.logo_url,
            price: base.price,
            market_cap: base.market_cap,
            price_to_sales: None,
            price_to_earnings: None,
            roic: None,
            above_sma_20: None,
            above_sma_50: None,
            above_sma_200: None,
            ytd_return: None,
            one_month_return: None,
            one_year_return: None,
            high_52w: None,
            low_52w: None,
            pct_from_high: None,
            rs_rank: None,
            sparkline: None,
            chart: None,
        }
    }
}

/// Latest quote for one symbol from a batch snapshot call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

/// Moving averages and where the reference price sits against them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignals {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub above_sma_20: Option<bool>,
    pub above_sma_50: Option<bool>,
    pub above_sma_200: Option<bool>,
}

impl TechnicalSignals {
    pub fn from_averages(
        reference_price: f64,
        sma_20: Option<f64>,
        sma_50: Option<f64>,
        sma_200: Option<f64>,
    ) -> Self {
        let above = |sma: Option<f64>| {
            sma.filter(|s| *s > 0.0 && reference_price > 0.0)
                .map(|s| reference_price > s)
        };
        Self {
            sma_20,
            sma_50,
            sma_200,
            above_sma_20: above(sma_20),
            above_sma_50: above(sma_50),
            above_sma_200: above(sma_200),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sma_20.is_none() && self.sma_50.is_none() && self.sma_200.is_none()
    }
}

/// Valuation and quality ratios for one instrument at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRatios {
    pub price_to_earnings: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub price_to_book: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub price_to_fcf: Option<f64>,
    pub peg_ratio: Option<f64>,
    /// Return on invested capital, percent
    pub roic: Option<f64>,
    /// Year-over-year revenue growth, percent
    pub revenue_growth: Option<f64>,
}

/// Ratio selector used by the valuation tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioKind {
    PriceToEarnings,
    PriceToSales,
    PriceToBook,
    EvToEbitda,
    PriceToFcf,
    Peg,
}

impl RatioKind {
    pub fn value(&self, ratios: &FundamentalRatios) -> Option<f64> {
        match self {
            RatioKind::PriceToEarnings => ratios.price_to_earnings,
            RatioKind::PriceToSales => ratios.price_to_sales,
            RatioKind::PriceToBook => ratios.price_to_book,
            RatioKind::EvToEbitda => ratios.ev_to_ebitda,
            RatioKind::PriceToFcf => ratios.price_to_fcf,
            RatioKind::Peg => ratios.peg_ratio,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RatioKind::PriceToEarnings => "P/E",
            RatioKind::PriceToSales => "P/S",
            RatioKind::PriceToBook => "P/B",
            RatioKind::EvToEbitda => "EV/EBITDA",
            RatioKind::PriceToFcf => "P/FCF",
            RatioKind::Peg => "PEG",
        }
    }
}

/// Ratios as of one fiscal quarter end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyRatio {
    pub period_end: NaiveDate,
    pub ratios: FundamentalRatios,
}

/// Current ratios for one peer company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRatio {
    pub symbol: String,
    pub ratios: FundamentalRatios,
}

/// Discounted-cash-flow estimate as published by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfRecord {
    pub symbol: String,
    pub intrinsic_value: f64,
    pub price: f64,
}

/// Company financials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    pub fiscal_period: String,
    pub fiscal_year: i32,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub cash_flow_operating: Option<f64>,
    pub cash_flow_investing: Option<f64>,
    pub cash_flow_financing: Option<f64>,
}
