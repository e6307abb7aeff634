use analysis_core::{AnalysisError, Bar, Financials, PriceSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub mod derive;
mod providers;

const BASE_URL: &str = "https://api.polygon.io";

/// Maximum symbols per batch snapshot request
const SNAPSHOT_CHUNK: usize = 100;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let oldest = ts.front().copied().unwrap_or(now);
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min for Starter plan. Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        Self::with_rate_limit(api_key, rate_limit)
    }

    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// Point the client at another host (a local mock server, a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        let request = builder.build().map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request.try_clone()
                .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await
                .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(AnalysisError::ApiError("Rate limited by Polygon after 3 retries".to_string()))
    }

    /// GET `path` and decode the body. 401/403/404 mean the plan or the
    /// symbol has no data and come back as `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, AnalysisError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send_request(
            self.client.get(&url).query(&[("apiKey", self.api_key.as_str())]).query(query)
        ).await?;

        let status = response.status().as_u16();
        if matches!(status, 401 | 403 | 404) {
            tracing::debug!("Polygon {} returned HTTP {}, treating as no data", path, status);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;
        Ok(Some(body))
    }

    /// Latest quotes for many symbols, batched into a few snapshot calls.
    pub async fn get_snapshots(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>, AnalysisError> {
        let mut snapshots = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(SNAPSHOT_CHUNK) {
            let body: Option<SnapshotsResponse> = self
                .get_json(
                    "/v2/snapshot/locale/us/markets/stocks/tickers",
                    &[("tickers", chunk.join(","))],
                )
                .await?;
            if let Some(body) = body {
                snapshots.extend(snapshots_from(body));
            }
        }
        Ok(snapshots)
    }

    /// Get aggregates (bars) for a symbol, oldest first
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let body: Option<AggregateResponse> = self
            .get_json(&path, &[("adjusted", "true".to_string()), ("sort", "asc".to_string()), ("limit", "50000".to_string())])
            .await?;

        Ok(body.map(bars_from).unwrap_or_default())
    }

    /// Quarterly financials, most recent first
    pub async fn get_financials(&self, symbol: &str, limit: usize) -> Result<Vec<Financials>, AnalysisError> {
        let body: Option<FinancialsResponse> = self
            .get_json(
                "/vX/reference/financials",
                &[
                    ("ticker", symbol.to_string()),
                    ("timeframe", "quarterly".to_string()),
                    ("order", "desc".to_string()),
                    ("sort", "period_of_report_date".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(body.map(|b| financials_from(symbol, b)).unwrap_or_default())
    }

    /// Get ticker details
    pub async fn get_ticker_details(&self, symbol: &str) -> Result<Option<TickerDetails>, AnalysisError> {
        let body: Option<TickerDetailsResponse> = self
            .get_json(&format!("/v3/reference/tickers/{}", symbol), &[])
            .await?;
        Ok(body.map(|b| b.results))
    }

    /// Get SMA (Simple Moving Average) values, most recent first
    pub async fn get_sma(
        &self,
        symbol: &str,
        window: u32,
        timespan: &str,
        limit: u32,
    ) -> Result<Vec<IndicatorValue>, AnalysisError> {
        let body: Option<IndicatorResponse> = self
            .get_json(
                &format!("/v1/indicators/sma/{}", symbol),
                &[
                    ("window", window.to_string()),
                    ("timespan", timespan.to_string()),
                    ("limit", limit.to_string()),
                    ("series_type", "close".to_string()),
                ],
            )
            .await?;

        Ok(body.and_then(|b| b.results.values).unwrap_or_default())
    }

    /// Tickers Polygon considers related (peers, competitors)
    pub async fn get_related_companies(&self, symbol: &str) -> Result<Vec<String>, AnalysisError> {
        let body: Option<RelatedCompaniesResponse> = self
            .get_json(&format!("/v1/related-companies/{}", symbol), &[])
            .await?;

        Ok(body
            .map(|b| {
                b.results
                    .into_iter()
                    .map(|r| r.ticker)
                    .filter(|t| !t.eq_ignore_ascii_case(symbol))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn snapshots_from(body: SnapshotsResponse) -> Vec<PriceSnapshot> {
    body.tickers
        .into_iter()
        .map(|t| {
            let positive = |v: Option<f64>| v.filter(|p| *p > 0.0);
            // last trade, then today's close, then yesterday's close
            let price = positive(t.last_trade.as_ref().and_then(|l| l.p))
                .or_else(|| positive(t.day.as_ref().and_then(|d| d.c)))
                .or_else(|| positive(t.prev_day.as_ref().and_then(|d| d.c)))
                .unwrap_or(0.0);
            PriceSnapshot {
                symbol: t.ticker,
                price,
                change_percent: t.todays_change_perc,
                market_cap: None,
            }
        })
        .collect()
}

fn bars_from(body: AggregateResponse) -> Vec<Bar> {
    body.results
        .into_iter()
        .filter_map(|r| {
            Some(Bar {
                timestamp: DateTime::from_timestamp_millis(r.t)?,
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
                volume: r.v,
                vwap: r.vw,
            })
        })
        .collect()
}

fn financials_from(symbol: &str, body: FinancialsResponse) -> Vec<Financials> {
    fn value(section: &HashMap<String, serde_json::Value>, field: &str) -> Option<f64> {
        section.get(field).and_then(|v| v.get("value")).and_then(|v| v.as_f64())
    }

    body.results
        .into_iter()
        .map(|r| {
            let income = &r.financials.income_statement;
            let balance = &r.financials.balance_sheet;
            let cash_flow = &r.financials.cash_flow_statement;

            Financials {
                symbol: symbol.to_string(),
                fiscal_period: r.fiscal_period.clone(),
                fiscal_year: r.fiscal_year.parse().unwrap_or(0),
                end_date: r
                    .end_date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                revenue: value(income, "revenues"),
                gross_profit: value(income, "gross_profit"),
                operating_income: value(income, "operating_income_loss"),
                net_income: value(income, "net_income_loss"),
                eps: value(income, "basic_earnings_per_share"),
                total_assets: value(balance, "assets"),
                total_liabilities: value(balance, "liabilities"),
                shareholders_equity: value(balance, "equity"),
                cash_flow_operating: value(cash_flow, "net_cash_flow_from_operating_activities"),
                cash_flow_investing: value(cash_flow, "net_cash_flow_from_investing_activities"),
                cash_flow_financing: value(cash_flow, "net_cash_flow_from_financing_activities"),
            }
        })
        .collect()
}

// Response structures
#[derive(Debug, Deserialize)]
struct SnapshotsResponse {
    #[serde(default)]
    tickers: Vec<SnapshotTicker>,
}

#[derive(Debug, Deserialize)]
struct SnapshotTicker {
    ticker: String,
    #[serde(default)]
    day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade", default)]
    last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay", default)]
    prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChangePerc", default)]
    todays_change_perc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDay {
    c: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotLastTrade {
    p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
    #[serde(default)]
    vw: Option<f64>, // volume-weighted average
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    fiscal_period: String,
    fiscal_year: String,
    #[serde(default)]
    end_date: Option<String>,
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
    #[serde(default)]
    balance_sheet: HashMap<String, serde_json::Value>,
    #[serde(default)]
    cash_flow_statement: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub share_class_shares_outstanding: Option<f64>,
    #[serde(default)]
    pub weighted_shares_outstanding: Option<f64>,
    #[serde(default)]
    pub sic_description: Option<String>,
}

impl TickerDetails {
    pub fn shares_outstanding(&self) -> Option<f64> {
        self.weighted_shares_outstanding
            .or(self.share_class_shares_outstanding)
            .filter(|s| *s > 0.0)
    }

    /// Price implied by market cap and share count
    pub fn implied_price(&self) -> Option<f64> {
        let cap = self.market_cap.filter(|c| *c > 0.0)?;
        Some(cap / self.shares_outstanding()?)
    }
}

#[derive(Debug, Deserialize)]
struct IndicatorResponse {
    results: IndicatorResults,
}

#[derive(Debug, Deserialize)]
struct IndicatorResults {
    values: Option<Vec<IndicatorValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub timestamp: Option<i64>,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RelatedCompaniesResponse {
    #[serde(default)]
    results: Vec<RelatedCompany>,
}

#[derive(Debug, Deserialize)]
struct RelatedCompany {
    ticker: String,
}
