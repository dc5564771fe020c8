//! Yahoo Finance provider
//!
//! Reads `/v8/finance/chart/{symbol}` for quotes, index snapshots, exchange
//! rates, price history and dividend events, and
//! `/v10/finance/quoteSummary/{symbol}` for company profiles.

use crate::config::MarketDataConfig;
use crate::error::ChatError;
use crate::gateway::{fx_symbol, percent_change, MarketDataProvider, MARKET_INDICES};
use crate::models::{
    CompanyProfile, DividendSummary, ExchangeRate, HistoryRange, IndexSnapshot, MarketOverview,
    PricePoint, PriceHistory, Quote,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "Yahoo Finance";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; financial-chat-relay/0.1)";

/// Market data over the public Yahoo Finance chart API
pub struct YahooMarketData {
    client: Client,
    base_url: String,
}

impl YahooMarketData {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ChatError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_chart(&self, symbol: &str) -> Result<ChartMeta> {
        let body = self
            .get_text(&chart_path(symbol), symbol, &[("range", "1d"), ("interval", "1d")])
            .await?;
        parse_chart_response(symbol, &body)
    }

    async fn get_text(&self, path: &str, symbol: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        debug!(symbol, path, "Fetching from {}", PROVIDER);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ChatError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ChatError::DataUnavailable(format!("unknown symbol {}", symbol)));
        }
        if !status.is_success() {
            return Err(ChatError::ProviderError(format!(
                "{} returned {} for {}",
                PROVIDER, status, symbol
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ChatError::from_transport(PROVIDER, e))
    }
}

fn chart_path(symbol: &str) -> String {
    format!("/v8/finance/chart/{}", symbol.replace('^', "%5E"))
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        let symbol = ticker.trim().to_uppercase();
        let meta = self.fetch_chart(&symbol).await?;

        Ok(Quote {
            change_percent: percent_change(meta.price, meta.previous_close()),
            previous_close: meta.previous_close(),
            currency: meta.currency.clone().unwrap_or_else(|| "USD".to_string()),
            as_of: meta.as_of(),
            price: meta.price,
            symbol,
        })
    }

    async fn get_company_profile(&self, ticker: &str) -> Result<CompanyProfile> {
        let symbol = ticker.trim().to_uppercase();
        let body = self
            .get_text(
                &format!("/v10/finance/quoteSummary/{}", symbol),
                &symbol,
                &[("modules", "assetProfile,price")],
            )
            .await?;
        parse_profile_response(&symbol, &body)
    }

    async fn get_dividends(&self, ticker: &str) -> Result<DividendSummary> {
        let symbol = ticker.trim().to_uppercase();
        let body = self
            .get_text(
                &chart_path(&symbol),
                &symbol,
                &[("range", "1y"), ("interval", "1mo"), ("events", "div")],
            )
            .await?;
        parse_dividends_response(&symbol, &body, Utc::now())
    }

    async fn get_price_history(&self, ticker: &str, range: HistoryRange) -> Result<PriceHistory> {
        let symbol = ticker.trim().to_uppercase();
        let body = self
            .get_text(
                &chart_path(&symbol),
                &symbol,
                &[("range", range.code()), ("interval", range.interval())],
            )
            .await?;
        parse_history_response(&symbol, range, &body)
    }

    async fn get_market_overview(&self) -> Result<MarketOverview> {
        let fetches = MARKET_INDICES
            .iter()
            .map(|(symbol, _)| self.fetch_chart(symbol));
        let results = join_all(fetches).await;

        let mut indices = Vec::new();
        let mut first_error = None;

        for ((symbol, name), result) in MARKET_INDICES.iter().zip(results) {
            match result {
                Ok(meta) => indices.push(IndexSnapshot {
                    symbol: symbol.to_string(),
                    name: name.to_string(),
                    value: meta.price,
                    change_percent: percent_change(meta.price, meta.previous_close()),
                }),
                Err(e) => {
                    warn!(symbol, "Index lookup failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if indices.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                ChatError::DataUnavailable("no market indices available".to_string())
            }));
        }

        Ok(MarketOverview {
            indices,
            as_of: Utc::now(),
        })
    }

    async fn get_exchange_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate> {
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();

        if base == quote {
            return Ok(ExchangeRate {
                base,
                quote,
                rate: 1.0,
                as_of: Utc::now(),
            });
        }

        let meta = self.fetch_chart(&fx_symbol(&base, &quote)).await?;

        Ok(ExchangeRate {
            as_of: meta.as_of(),
            rate: meta.price,
            base,
            quote,
        })
    }
}

// =============================
// Wire format
// =============================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: RawMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<Indicators>,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
}

#[derive(Debug, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: Option<HashMap<String, DividendEvent>>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    price: Option<SummaryPrice>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPrice {
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    currency: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

/// Normalized chart metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ChartMeta {
    pub price: f64,
    pub currency: Option<String>,
    pub chart_previous_close: Option<f64>,
    pub previous_close: Option<f64>,
    pub market_time: Option<i64>,
}

impl ChartMeta {
    pub fn previous_close(&self) -> Option<f64> {
        self.previous_close.or(self.chart_previous_close)
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.market_time
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now)
    }
}

impl ChartError {
    fn into_error(self, symbol: &str) -> ChatError {
        let code = self.code.unwrap_or_default();
        let description = self.description.unwrap_or_default();
        if code.eq_ignore_ascii_case("not found") {
            ChatError::DataUnavailable(format!("unknown symbol {}", symbol))
        } else {
            ChatError::ProviderError(format!("{} error {}: {}", PROVIDER, code, description))
        }
    }
}

fn decode_chart(symbol: &str, body: &str) -> Result<ChartResult> {
    let envelope: ChartEnvelope = serde_json::from_str(body).map_err(|e| {
        ChatError::ProviderError(format!("{} sent an unreadable chart: {}", PROVIDER, e))
    })?;

    if let Some(error) = envelope.chart.error {
        return Err(error.into_error(symbol));
    }

    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ChatError::DataUnavailable(format!("no chart data for {}", symbol)))
}

/// Parse a chart response body for `symbol`
pub fn parse_chart_response(symbol: &str, body: &str) -> Result<ChartMeta> {
    let meta = decode_chart(symbol, body)?.meta;

    let price = meta
        .regular_market_price
        .filter(|p| p.is_finite())
        .ok_or_else(|| ChatError::DataUnavailable(format!("no price for {}", symbol)))?;

    Ok(ChartMeta {
        price,
        currency: meta.currency,
        chart_previous_close: meta.chart_previous_close,
        previous_close: meta.previous_close,
        market_time: meta.regular_market_time,
    })
}

/// Closing prices from a chart response; null closes are skipped
pub fn parse_history_response(
    symbol: &str,
    range: HistoryRange,
    body: &str,
) -> Result<PriceHistory> {
    let chart = decode_chart(symbol, body)?;

    let timestamps = chart.timestamp.unwrap_or_default();
    let closes = chart
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .and_then(|q| q.close)
        .unwrap_or_default();

    let points: Vec<PricePoint> = timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close.filter(|c| c.is_finite())?;
            let date = Utc.timestamp_opt(*ts, 0).single()?;
            Some(PricePoint { date, close })
        })
        .collect();

    if points.is_empty() {
        return Err(ChatError::DataUnavailable(format!(
            "no price history for {}",
            symbol
        )));
    }

    Ok(PriceHistory {
        symbol: symbol.to_string(),
        range,
        currency: chart.meta.currency.unwrap_or_else(|| "USD".to_string()),
        points,
    })
}

/// Dividend events paid within the year before `now`
pub fn parse_dividends_response(
    symbol: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<DividendSummary> {
    let chart = decode_chart(symbol, body)?;
    let cutoff = now - chrono::Duration::days(365);

    let mut events: Vec<(DateTime<Utc>, f64)> = chart
        .events
        .and_then(|e| e.dividends)
        .unwrap_or_default()
        .into_values()
        .filter_map(|event| {
            let paid = Utc.timestamp_opt(event.date, 0).single()?;
            (paid >= cutoff && event.amount > 0.0).then_some((paid, event.amount))
        })
        .collect();
    events.sort_by_key(|(paid, _)| *paid);

    let Some((last_paid, last_amount)) = events.last().copied() else {
        return Ok(DividendSummary::none(symbol));
    };

    Ok(DividendSummary {
        symbol: symbol.to_string(),
        payments: events.len(),
        trailing_annual: events.iter().map(|(_, amount)| amount).sum(),
        last_amount: Some(last_amount),
        last_paid: Some(last_paid),
    })
}

/// Company name, sector and industry from a quoteSummary response
pub fn parse_profile_response(symbol: &str, body: &str) -> Result<CompanyProfile> {
    let envelope: SummaryEnvelope = serde_json::from_str(body).map_err(|e| {
        ChatError::ProviderError(format!("{} sent an unreadable summary: {}", PROVIDER, e))
    })?;

    if let Some(error) = envelope.quote_summary.error {
        return Err(error.into_error(symbol));
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ChatError::DataUnavailable(format!("no company profile for {}", symbol)))?;

    let (sector, industry) = result
        .asset_profile
        .map(|p| (p.sector, p.industry))
        .unwrap_or_default();
    let name = result.price.and_then(|p| p.long_name.or(p.short_name));

    if name.is_none() && sector.is_none() {
        return Err(ChatError::DataUnavailable(format!(
            "no company profile for {}",
            symbol
        )));
    }

    Ok(CompanyProfile {
        symbol: symbol.to_string(),
        name,
        sector,
        industry,
    })
}
