//! Financial Data Gateway
//!
//! Stateless lookups against a market-data provider. Every call is a single
//! attempt; retry policy belongs to the tool dispatcher.

use crate::error::ChatError;
use crate::models::{
    CompanyProfile, DividendSummary, ExchangeRate, HistoryRange, IndexSnapshot, MarketOverview,
    PricePoint, PriceHistory, Quote,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub mod yahoo;
pub use yahoo::YahooMarketData;

/// Indices reported by a market overview: (symbol, display name)
pub const MARKET_INDICES: &[(&str, &str)] = &[
    ("^GSPC", "S&P 500"),
    ("^DJI", "Dow Jones"),
    ("^IXIC", "NASDAQ Composite"),
];

/// Base and targets for a rate table when no pair was named
pub const DEFAULT_FX_BASE: &str = "USD";
pub const DEFAULT_FX_TARGETS: &[&str] = &["EUR", "GBP", "JPY", "CAD"];

/// Provider symbol for an FX pair, e.g. `EURUSD=X`
pub fn fx_symbol(base: &str, quote: &str) -> String {
    format!("{}{}=X", base.to_uppercase(), quote.to_uppercase())
}

/// Percent change from `previous` to `current`, when `previous` is usable
pub fn percent_change(current: f64, previous: Option<f64>) -> Option<f64> {
    previous
        .filter(|p| *p > 0.0)
        .map(|p| (current - p) / p * 100.0)
}

/// Remote market-data service
///
/// Fails with `DataUnavailable` for unknown symbols, `ProviderTimeout` when
/// the provider does not answer in time and `ProviderError` otherwise.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_quote(&self, ticker: &str) -> Result<Quote>;

    async fn get_company_profile(&self, ticker: &str) -> Result<CompanyProfile>;

    /// Trailing-year dividends. A symbol that pays none is not an error.
    async fn get_dividends(&self, ticker: &str) -> Result<DividendSummary>;

    async fn get_price_history(&self, ticker: &str, range: HistoryRange) -> Result<PriceHistory>;

    async fn get_market_overview(&self) -> Result<MarketOverview>;

    async fn get_exchange_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate>;
}

// =============================
// Mock Provider
// =============================

/// Failure a [`MockMarketData`] can be scripted to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFailure {
    Unavailable,
    Timeout,
    Provider,
}

impl GatewayFailure {
    fn into_error(self, what: &str) -> ChatError {
        match self {
            GatewayFailure::Unavailable => {
                ChatError::DataUnavailable(format!("no data for {}", what))
            }
            GatewayFailure::Timeout => {
                ChatError::ProviderTimeout(format!("mock provider timed out on {}", what))
            }
            GatewayFailure::Provider => {
                ChatError::ProviderError(format!("mock provider failed on {}", what))
            }
        }
    }
}

/// Fixture-backed provider for development & testing.
/// Keeps the relay functional without network access.
pub struct MockMarketData {
    quotes: HashMap<String, (f64, f64)>,
    profiles: HashMap<String, CompanyProfile>,
    dividends: HashMap<String, f64>,
    rates: HashMap<(String, String), f64>,
    indices: Vec<IndexSnapshot>,
    failures: Mutex<VecDeque<GatewayFailure>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        let quotes = [
            ("AAPL", 150.25, 148.10),
            ("MSFT", 410.50, 405.00),
            ("GOOGL", 140.10, 141.30),
            ("AMZN", 178.40, 175.90),
            ("TSLA", 245.00, 250.20),
            ("NVDA", 880.00, 862.50),
        ]
        .into_iter()
        .map(|(symbol, price, previous)| (symbol.to_string(), (price, previous)))
        .collect();

        let profiles = [
            ("AAPL", "Apple Inc.", "Technology", "Consumer Electronics"),
            ("MSFT", "Microsoft Corporation", "Technology", "Software"),
            ("GOOGL", "Alphabet Inc.", "Communication Services", "Internet Content"),
            ("AMZN", "Amazon.com, Inc.", "Consumer Cyclical", "Internet Retail"),
            ("TSLA", "Tesla, Inc.", "Consumer Cyclical", "Auto Manufacturers"),
            ("NVDA", "NVIDIA Corporation", "Technology", "Semiconductors"),
        ]
        .into_iter()
        .map(|(symbol, name, sector, industry)| {
            (
                symbol.to_string(),
                CompanyProfile {
                    symbol: symbol.to_string(),
                    name: Some(name.to_string()),
                    sector: Some(sector.to_string()),
                    industry: Some(industry.to_string()),
                },
            )
        })
        .collect();

        // Quarterly payment per share
        let dividends = [("AAPL", 0.24), ("MSFT", 0.75), ("GOOGL", 0.20), ("NVDA", 0.01)]
            .into_iter()
            .map(|(symbol, amount)| (symbol.to_string(), amount))
            .collect();

        let rates = [
            ("USD", "EUR", 0.92),
            ("USD", "GBP", 0.79),
            ("USD", "JPY", 149.50),
            ("USD", "INR", 83.20),
            ("USD", "CAD", 1.35),
        ]
        .into_iter()
        .map(|(base, quote, rate)| ((base.to_string(), quote.to_string()), rate))
        .collect();

        let indices = vec![
            IndexSnapshot {
                symbol: "^GSPC".to_string(),
                name: "S&P 500".to_string(),
                value: 5012.40,
                change_percent: Some(0.42),
            },
            IndexSnapshot {
                symbol: "^DJI".to_string(),
                name: "Dow Jones".to_string(),
                value: 38650.10,
                change_percent: Some(0.18),
            },
            IndexSnapshot {
                symbol: "^IXIC".to_string(),
                name: "NASDAQ Composite".to_string(),
                value: 15980.75,
                change_percent: Some(-0.25),
            },
        ];

        Self {
            quotes,
            profiles,
            dividends,
            rates,
            indices,
            failures: Mutex::new(VecDeque::new()),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add or replace a fixture quote (previous close equal to price)
    pub fn with_quote(mut self, ticker: &str, price: f64) -> Self {
        self.quotes.insert(ticker.to_uppercase(), (price, price));
        self
    }

    pub fn with_rate(mut self, base: &str, quote: &str, rate: f64) -> Self {
        self.rates
            .insert((base.to_uppercase(), quote.to_uppercase()), rate);
        self
    }

    /// Delay every call, to exercise interleaving
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a failure for the next call
    pub async fn push_failure(&self, failure: GatewayFailure) {
        self.failures.lock().await.push_back(failure);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self, what: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.failures.lock().await.pop_front() {
            Some(failure) => Err(failure.into_error(what)),
            None => Ok(()),
        }
    }

    fn lookup_rate(&self, base: &str, quote: &str) -> Option<f64> {
        self.direct_or_inverse(base, quote).or_else(|| {
            // Cross through USD
            Some(self.direct_or_inverse(base, "USD")? * self.direct_or_inverse("USD", quote)?)
        })
    }

    fn direct_or_inverse(&self, base: &str, quote: &str) -> Option<f64> {
        if base == quote {
            return Some(1.0);
        }
        self.rates
            .get(&(base.to_string(), quote.to_string()))
            .copied()
            .or_else(|| {
                self.rates
                    .get(&(quote.to_string(), base.to_string()))
                    .map(|r| 1.0 / r)
            })
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        let symbol = ticker.to_uppercase();
        self.begin_call(&symbol).await?;

        let (price, previous) = self
            .quotes
            .get(&symbol)
            .copied()
            .ok_or_else(|| ChatError::DataUnavailable(format!("unknown symbol {}", symbol)))?;

        Ok(Quote {
            symbol,
            price,
            currency: "USD".to_string(),
            previous_close: Some(previous),
            change_percent: percent_change(price, Some(previous)),
            as_of: Utc::now(),
        })
    }

    async fn get_company_profile(&self, ticker: &str) -> Result<CompanyProfile> {
        let symbol = ticker.to_uppercase();
        self.begin_call(&symbol).await?;

        self.profiles
            .get(&symbol)
            .cloned()
            .ok_or_else(|| ChatError::DataUnavailable(format!("no company profile for {}", symbol)))
    }

    async fn get_dividends(&self, ticker: &str) -> Result<DividendSummary> {
        let symbol = ticker.to_uppercase();
        self.begin_call(&symbol).await?;

        if !self.quotes.contains_key(&symbol) {
            return Err(ChatError::DataUnavailable(format!("unknown symbol {}", symbol)));
        }

        Ok(match self.dividends.get(&symbol) {
            Some(amount) => DividendSummary {
                payments: 4,
                trailing_annual: amount * 4.0,
                last_amount: Some(*amount),
                last_paid: Some(Utc::now() - ChronoDuration::days(30)),
                symbol,
            },
            None => DividendSummary::none(symbol),
        })
    }

    /// Evenly spaced closes rising 10% into the current price
    async fn get_price_history(&self, ticker: &str, range: HistoryRange) -> Result<PriceHistory> {
        let symbol = ticker.to_uppercase();
        self.begin_call(&symbol).await?;

        let (price, _) = self
            .quotes
            .get(&symbol)
            .copied()
            .ok_or_else(|| ChatError::DataUnavailable(format!("unknown symbol {}", symbol)))?;

        let count: i64 = match range {
            HistoryRange::FiveDays => 5,
            HistoryRange::OneMonth => 21,
            _ => 30,
        };
        let start = price / 1.1;
        let now = Utc::now();
        let points = (0..count)
            .map(|i| PricePoint {
                date: now - ChronoDuration::days(count - 1 - i),
                close: start + (price - start) * i as f64 / (count - 1) as f64,
            })
            .collect();

        Ok(PriceHistory {
            symbol,
            range,
            currency: "USD".to_string(),
            points,
        })
    }

    async fn get_market_overview(&self) -> Result<MarketOverview> {
        self.begin_call("market overview").await?;

        Ok(MarketOverview {
            indices: self.indices.clone(),
            as_of: Utc::now(),
        })
    }

    async fn get_exchange_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate> {
        let base = base.to_uppercase();
        let quote = quote.to_uppercase();
        self.begin_call(&fx_symbol(&base, &quote)).await?;

        let rate = self.lookup_rate(&base, &quote).ok_or_else(|| {
            ChatError::DataUnavailable(format!("no exchange rate for {}/{}", base, quote))
        })?;

        Ok(ExchangeRate {
            base,
            quote,
            rate,
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_symbol() {
        assert_eq!(fx_symbol("eur", "usd"), "EURUSD=X");
    }

    #[test]
    fn test_percent_change() {
        let change = percent_change(110.0, Some(100.0)).unwrap();
        assert!((change - 10.0).abs() < 1e-9);
        assert!(percent_change(110.0, Some(0.0)).is_none());
        assert!(percent_change(110.0, None).is_none());
    }

    #[tokio::test]
    async fn test_mock_quote() {
        let provider = MockMarketData::new().with_quote("AAPL", 150.25);
        let quote = provider.get_quote("aapl").await.unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, 150.25);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_unknown_symbol() {
        let provider = MockMarketData::new();
        let err = provider.get_quote("ZZZZ").await.unwrap_err();
        assert!(matches!(err, ChatError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_mock_scripted_failure_is_consumed() {
        let provider = MockMarketData::new();
        provider.push_failure(GatewayFailure::Timeout).await;

        let err = tokio_test::assert_err!(provider.get_quote("AAPL").await);
        assert!(matches!(err, ChatError::ProviderTimeout(_)));
        tokio_test::assert_ok!(provider.get_quote("AAPL").await);
    }

    #[tokio::test]
    async fn test_mock_exchange_rates() {
        let provider = MockMarketData::new();

        let direct = provider.get_exchange_rate("USD", "EUR").await.unwrap();
        assert_eq!(direct.rate, 0.92);

        let inverse = provider.get_exchange_rate("EUR", "USD").await.unwrap();
        assert!((inverse.rate - 1.0 / 0.92).abs() < 1e-9);

        let cross = provider.get_exchange_rate("EUR", "GBP").await.unwrap();
        assert!((cross.rate - 0.79 / 0.92).abs() < 1e-9);

        tokio_test::assert_err!(provider.get_exchange_rate("USD", "XAU").await);
    }

    #[tokio::test]
    async fn test_mock_profile_and_dividends() {
        let provider = MockMarketData::new();

        let profile = provider.get_company_profile("aapl").await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.sector.as_deref(), Some("Technology"));

        let dividends = provider.get_dividends("AAPL").await.unwrap();
        assert!(dividends.pays_dividends());
        assert!((dividends.trailing_annual - 0.96).abs() < 1e-9);

        let none = provider.get_dividends("TSLA").await.unwrap();
        assert!(!none.pays_dividends());

        tokio_test::assert_err!(provider.get_dividends("ZZZZ").await);
        tokio_test::assert_err!(
            MockMarketData::new()
                .with_quote("XYZ", 10.0)
                .get_company_profile("XYZ")
                .await
        );
    }

    #[tokio::test]
    async fn test_mock_price_history() {
        let provider = MockMarketData::new().with_quote("AAPL", 110.0);
        let history = provider
            .get_price_history("AAPL", HistoryRange::OneMonth)
            .await
            .unwrap();

        assert_eq!(history.points.len(), 21);
        assert!((history.last().unwrap().close - 110.0).abs() < 1e-9);
        assert!((history.change_percent().unwrap() - 10.0).abs() < 1e-9);
        assert!(history.points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[tokio::test]
    async fn test_mock_overview() {
        let overview = MockMarketData::new().get_market_overview().await.unwrap();
        assert_eq!(overview.indices.len(), MARKET_INDICES.len());
    }
}
