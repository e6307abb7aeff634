use analysis_core::stats::{percent_change, round2};
use analysis_core::Bar;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Trailing returns in percent, rounded to two decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturns {
    pub ytd: Option<f64>,
    pub one_month: Option<f64>,
    pub one_year: Option<f64>,
}

/// 52-week range extracted from a bar series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// Returns over the standard horizons for an oldest-first bar series ending
/// at `now`.
///
/// One-year return is measured from the first bar. Year-to-date and one-month
/// returns anchor on the first bar dated on/after January 1 of `now`'s year
/// and on/after `now` minus one month; anchors with a non-positive close are
/// skipped. A horizon without an anchor is `None`.
pub fn compute_returns(bars: &[Bar], now: DateTime<Utc>) -> PeriodReturns {
    if bars.len() < 2 {
        return PeriodReturns::default();
    }
    let latest = match bars.last() {
        Some(bar) if bar.close != 0.0 => bar.close,
        _ => return PeriodReturns::default(),
    };

    let one_year = percent_change(bars[0].close, latest).map(round2);

    let year_start = NaiveDate::from_ymd_opt(now.year(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let ytd = year_start.and_then(|start| anchored_return(bars, start, latest));

    let one_month = now
        .checked_sub_months(Months::new(1))
        .and_then(|start| anchored_return(bars, start, latest));

    PeriodReturns {
        ytd,
        one_month,
        one_year,
    }
}

fn anchored_return(bars: &[Bar], since: DateTime<Utc>, latest: f64) -> Option<f64> {
    bars.iter()
        .find(|b| b.timestamp >= since && b.close > 0.0)
        .and_then(|anchor| percent_change(anchor.close, latest))
        .map(round2)
}

/// Highest high and lowest positive low across the series. Only lows are
/// filtered; a zero low is a missing print, not a price.
pub fn price_range(bars: &[Bar]) -> PriceRange {
    let high = bars
        .iter()
        .map(|b| b.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))));
    let low = bars
        .iter()
        .map(|b| b.low)
        .filter(|l| *l > 0.0)
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));
    PriceRange { high, low }
}
