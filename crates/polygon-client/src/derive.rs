//! Ratio and DCF derivations from raw quarterly financials.
//!
//! Flow items (revenue, EPS, cash flow) are summed over the trailing four
//! quarters; balance sheet items come from the latest quarter in the window.

use analysis_core::{Financials, FundamentalRatios, QuarterlyRatio};
use chrono::NaiveDate;

/// US corporate tax rate used for after-tax operating income
const TAX_RATE: f64 = 0.21;
const EQUITY_RISK_PREMIUM: f64 = 0.055;
const DEFAULT_RISK_FREE: f64 = 0.045;
const TERMINAL_GROWTH: f64 = 0.03;

/// Sum a field across quarters, `None` if no quarter reports it.
fn sum_ttm(quarters: &[Financials], accessor: fn(&Financials) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = quarters.iter().filter_map(accessor).collect();
    if values.is_empty() { None } else { Some(values.iter().sum()) }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// TTM revenue growth YoY in percent. Needs at least three reporting quarters
/// in each year; counts are normalised when they differ.
pub fn revenue_growth(financials: &[Financials]) -> Option<f64> {
    if financials.len() < 5 {
        return None;
    }
    let prior = &financials[4..financials.len().min(8)];
    let current = &financials[..4];
    let current_count = current.iter().filter(|f| f.revenue.is_some()).count();
    let prior_count = prior.iter().filter(|f| f.revenue.is_some()).count();
    if current_count < 3 || prior_count < 3 {
        return None;
    }
    let current_ttm: f64 = current.iter().filter_map(|f| f.revenue).sum();
    let prior_ttm: f64 = prior.iter().filter_map(|f| f.revenue).sum();
    if prior_ttm <= 0.0 {
        return None;
    }
    let current_norm = current_ttm / current_count as f64 * 4.0;
    let prior_norm = prior_ttm / prior_count as f64 * 4.0;
    Some((current_norm - prior_norm) / prior_norm * 100.0)
}

/// Valuation multiples for one trailing-twelve-month window.
/// `window` is most recent first; `price` and `shares` are as of its end.
pub fn ttm_ratios(window: &[Financials], price: f64, shares: f64) -> FundamentalRatios {
    let mut ratios = FundamentalRatios::default();
    let Some(latest) = window.first() else {
        return ratios;
    };
    if price <= 0.0 || shares <= 0.0 {
        return ratios;
    }
    let market_cap = price * shares;

    let ttm_eps = positive(sum_ttm(window, |f| f.eps));
    let ttm_revenue = positive(sum_ttm(window, |f| f.revenue));
    let ttm_op_income = sum_ttm(window, |f| f.operating_income);
    let ttm_fcf = match (sum_ttm(window, |f| f.cash_flow_operating), sum_ttm(window, |f| f.cash_flow_investing)) {
        (Some(ocf), Some(cfi)) => Some(ocf + cfi),
        _ => None,
    };

    ratios.price_to_earnings = ttm_eps.map(|eps| price / eps);
    ratios.price_to_sales = ttm_revenue.map(|rev| market_cap / rev);
    ratios.price_to_book = positive(latest.shareholders_equity).map(|eq| market_cap / eq);
    ratios.price_to_fcf = positive(ttm_fcf).map(|fcf| market_cap / fcf);

    // ROIC: after-tax operating income over equity + liabilities
    if let (Some(op_income), Some(equity), Some(liabilities)) =
        (ttm_op_income, latest.shareholders_equity, latest.total_liabilities)
    {
        let invested_capital = equity + liabilities;
        if invested_capital > 0.0 {
            ratios.roic = Some(op_income * (1.0 - TAX_RATE) / invested_capital * 100.0);
        }
    }

    ratios
}

/// Current ratios from the latest financials, with growth and PEG.
/// `None` without a price and share count, or when nothing could be derived.
pub fn current_ratios(financials: &[Financials], price: f64, shares: f64) -> Option<FundamentalRatios> {
    if price <= 0.0 || shares <= 0.0 {
        return None;
    }
    let window = &financials[..financials.len().min(4)];
    let mut ratios = ttm_ratios(window, price, shares);
    ratios.revenue_growth = revenue_growth(financials);
    if let (Some(pe), Some(growth)) = (ratios.price_to_earnings, ratios.revenue_growth) {
        if growth > 0.0 {
            ratios.peg_ratio = Some(pe / growth);
        }
    }

    if ratios == FundamentalRatios::default() {
        None
    } else {
        Some(ratios)
    }
}

/// Last close on or before `date`. `closes` must be oldest first.
fn close_on_or_before(closes: &[(NaiveDate, f64)], date: NaiveDate) -> Option<f64> {
    closes
        .iter()
        .take_while(|(d, _)| *d <= date)
        .last()
        .map(|(_, c)| *c)
        .filter(|c| *c > 0.0)
}

/// Quarterly multiples, most recent first. Each quarter uses its own
/// trailing four quarters and the close at quarter end; quarters without a
/// full window, an end date or a price are skipped.
pub fn ratio_history(
    financials: &[Financials],
    closes: &[(NaiveDate, f64)],
    shares: f64,
    quarters: usize,
) -> Vec<QuarterlyRatio> {
    let mut history = Vec::new();
    for i in 0..financials.len().saturating_sub(3) {
        if history.len() >= quarters {
            break;
        }
        let window = &financials[i..i + 4];
        let Some(period_end) = window[0].end_date else {
            continue;
        };
        let Some(price) = close_on_or_before(closes, period_end) else {
            continue;
        };
        let ratios = ttm_ratios(window, price, shares);
        if ratios != FundamentalRatios::default() {
            history.push(QuarterlyRatio { period_end, ratios });
        }
    }
    history
}

/// DCF-lite intrinsic value per share: five years of TTM free cash flow per
/// share grown at the (clamped) revenue growth rate, plus a Gordon terminal
/// value, discounted at risk-free + equity risk premium (floor 8%).
pub fn dcf_lite(financials: &[Financials], shares: f64, risk_free_rate: Option<f64>) -> Option<f64> {
    if shares <= 0.0 {
        return None;
    }
    let window = &financials[..financials.len().min(4)];
    let ocf = sum_ttm(window, |f| f.cash_flow_operating)?;
    let cfi = sum_ttm(window, |f| f.cash_flow_investing)?;
    let fcf_per_share = (ocf + cfi) / shares;
    if fcf_per_share <= 0.0 {
        return None;
    }

    let growth_rate = revenue_growth(financials)
        .map(|g| (g / 100.0).clamp(-0.05, 0.25))
        .unwrap_or(0.03);
    let rf = risk_free_rate.unwrap_or(DEFAULT_RISK_FREE);
    let discount_rate = (rf + EQUITY_RISK_PREMIUM).max(0.08);

    let projected_fcf: f64 = (1_i32..=5)
        .map(|i| fcf_per_share * (1.0 + growth_rate).powi(i) / (1.0 + discount_rate).powi(i))
        .sum();
    let terminal_value = fcf_per_share
        * (1.0 + growth_rate).powi(5)
        * (1.0 + TERMINAL_GROWTH)
        / (discount_rate - TERMINAL_GROWTH);
    let terminal_pv = terminal_value / (1.0 + discount_rate).powi(5);

    Some(projected_fcf + terminal_pv)
}
