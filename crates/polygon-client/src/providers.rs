//! Provider port implementations on top of the REST client.

use analysis_core::{
    AnalysisError, Bar, BarsProvider, DcfProvider, DcfRecord, FundamentalRatios, PeersProvider,
    PriceSnapshot, QuarterlyRatio, RatiosProvider, SnapshotProvider, TechnicalSignals,
    TechnicalsProvider,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::derive::{current_ratios, dcf_lite, ratio_history};
use crate::{IndicatorValue, PolygonClient};

/// Quarters fetched for current ratios: TTM plus the prior year for growth
const CURRENT_QUARTERS: usize = 8;

fn latest_value(values: Vec<IndicatorValue>) -> Option<f64> {
    values.into_iter().find_map(|v| v.value).filter(|v| *v > 0.0)
}

#[async_trait]
impl SnapshotProvider for PolygonClient {
    async fn fetch_snapshots(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>, AnalysisError> {
        self.get_snapshots(symbols).await
    }
}

#[async_trait]
impl TechnicalsProvider for PolygonClient {
    async fn fetch_technicals(
        &self,
        symbol: &str,
        reference_price: f64,
    ) -> Result<Option<TechnicalSignals>, AnalysisError> {
        let (sma20, sma50, sma200) = tokio::join!(
            self.get_sma(symbol, 20, "day", 1),
            self.get_sma(symbol, 50, "day", 1),
            self.get_sma(symbol, 200, "day", 1),
        );

        let signals = TechnicalSignals::from_averages(
            reference_price,
            latest_value(sma20?),
            latest_value(sma50?),
            latest_value(sma200?),
        );
        Ok(if signals.is_empty() { None } else { Some(signals) })
    }
}

#[async_trait]
impl RatiosProvider for PolygonClient {
    async fn fetch_ratios(&self, symbol: &str) -> Result<Option<FundamentalRatios>, AnalysisError> {
        let (details, financials) = tokio::join!(
            self.get_ticker_details(symbol),
            self.get_financials(symbol, CURRENT_QUARTERS),
        );
        let Some(details) = details? else {
            return Ok(None);
        };
        let financials = financials?;

        let (Some(price), Some(shares)) = (details.implied_price(), details.shares_outstanding()) else {
            tracing::debug!("{}: no market cap or share count, skipping ratios", symbol);
            return Ok(None);
        };
        Ok(current_ratios(&financials, price, shares))
    }

    async fn fetch_ratio_history(
        &self,
        symbol: &str,
        quarters: usize,
    ) -> Result<Vec<QuarterlyRatio>, AnalysisError> {
        // Each quarter needs its own trailing four
        let (details, financials) = tokio::join!(
            self.get_ticker_details(symbol),
            self.get_financials(symbol, quarters + 3),
        );
        let financials = financials?;
        let Some(shares) = details?.and_then(|d| d.shares_outstanding()) else {
            return Ok(Vec::new());
        };
        let Some(earliest) = financials.iter().filter_map(|f| f.end_date).min() else {
            return Ok(Vec::new());
        };

        let to = Utc::now();
        let from = earliest
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc() - Duration::days(14))
            .unwrap_or(to - Duration::days(365 * 6));
        let weekly = self.get_aggregates(symbol, 1, "week", from, to).await?;
        let closes: Vec<_> = weekly
            .iter()
            .map(|b| (b.timestamp.date_naive(), b.close))
            .collect();

        Ok(ratio_history(&financials, &closes, shares, quarters))
    }
}

#[async_trait]
impl BarsProvider for PolygonClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        self.get_aggregates(symbol, 1, "day", from, to).await
    }
}

#[async_trait]
impl PeersProvider for PolygonClient {
    async fn fetch_peers(&self, symbol: &str) -> Result<Vec<String>, AnalysisError> {
        self.get_related_companies(symbol).await
    }
}

#[async_trait]
impl DcfProvider for PolygonClient {
    async fn fetch_dcf(&self, symbol: &str) -> Result<Option<DcfRecord>, AnalysisError> {
        let (details, financials) = tokio::join!(
            self.get_ticker_details(symbol),
            self.get_financials(symbol, CURRENT_QUARTERS),
        );
        let Some(details) = details? else {
            return Ok(None);
        };
        let financials = financials?;

        let (Some(price), Some(shares)) = (details.implied_price(), details.shares_outstanding()) else {
            return Ok(None);
        };
        Ok(dcf_lite(&financials, shares, None).map(|intrinsic_value| DcfRecord {
            symbol: symbol.to_string(),
            intrinsic_value,
            price,
        }))
    }
}
