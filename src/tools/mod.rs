//! Tool Dispatch Layer
//!
//! Maps classified intents to gateway calls or local advice and always hands
//! back a [`ToolResult`]. Provider failures become failed results; they never
//! propagate to the caller.

use crate::error::ChatError;
use crate::gateway::{MarketDataProvider, DEFAULT_FX_BASE, DEFAULT_FX_TARGETS};
use crate::models::{
    CurrencyConversion, FailureKind, FinancialState, RateTable, StockAnalysis, ToolOutcome,
    ToolResult,
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod advice;
pub mod classifier;

pub use classifier::{IntentClassifier, ToolRequest};

/// Base delay between attempts, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Runs tool requests against the market-data provider
pub struct ToolDispatcher {
    provider: Arc<dyn MarketDataProvider>,
    max_attempts: u32,
    backoff: Duration,
}

impl ToolDispatcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, max_attempts: u32) -> Self {
        Self {
            provider,
            max_attempts: max_attempts.max(1),
            backoff: RETRY_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Classify without running anything
    pub fn classify(&self, message: &str) -> Option<ToolRequest> {
        IntentClassifier::classify(message)
    }

    /// Classify `message` and run the matching tool, if any
    pub async fn classify_and_run(
        &self,
        message: &str,
        state: &mut FinancialState,
    ) -> Option<ToolResult> {
        let request = self.classify(message)?;
        Some(self.run(request, state).await)
    }

    /// Run one request, recording the result as the state's last tool result.
    ///
    /// Budget figures found in the request are stored on the state first.
    pub async fn run(&self, request: ToolRequest, state: &mut FinancialState) -> ToolResult {
        if let ToolRequest::BudgetAdvice { income, expenses } = &request {
            if income.is_some() {
                state.monthly_income = *income;
            }
            if expenses.is_some() {
                state.monthly_expenses = *expenses;
            }
        }

        let result = self.execute(&request, state).await;

        info!(
            intent = %result.intent,
            success = result.is_success(),
            "Tool run finished"
        );

        state.last_tool_result = Some(result.clone());
        result
    }

    async fn execute(&self, request: &ToolRequest, state: &FinancialState) -> ToolResult {
        let intent = request.intent();
        let parameters = request.parameters();

        let outcome = match request {
            ToolRequest::StockQuote { ticker: None } => {
                return ToolResult::failed(
                    intent,
                    parameters,
                    FailureKind::MissingParameters,
                    "I could not tell which stock you mean; please include its ticker symbol",
                );
            }
            ToolRequest::StockQuote {
                ticker: Some(ticker),
            } => self.analyze_stock(ticker).await.map(ToolOutcome::Stock),
            ToolRequest::PriceHistory { ticker: None, .. } => {
                return ToolResult::failed(
                    intent,
                    parameters,
                    FailureKind::MissingParameters,
                    "I could not tell which stock you mean; please include its ticker symbol",
                );
            }
            ToolRequest::PriceHistory {
                ticker: Some(ticker),
                range,
            } => self
                .with_retry(intent.as_str(), move || {
                    self.provider.get_price_history(ticker, *range)
                })
                .await
                .map(ToolOutcome::History),
            ToolRequest::MarketOverview => self
                .with_retry(intent.as_str(), move || self.provider.get_market_overview())
                .await
                .map(ToolOutcome::MarketOverview),
            ToolRequest::CurrencyConversion { pair: None, .. } => {
                self.default_rates().await.map(ToolOutcome::Rates)
            }
            ToolRequest::CurrencyConversion {
                pair: Some((base, quote)),
                amount,
            } => self
                .with_retry(intent.as_str(), move || self.provider.get_exchange_rate(base, quote))
                .await
                .map(|rate| {
                    ToolOutcome::Conversion(CurrencyConversion {
                        converted: amount * rate.rate,
                        amount: *amount,
                        rate,
                    })
                }),
            ToolRequest::PortfolioAdvice => {
                return local_result(
                    intent,
                    parameters,
                    advice::portfolio_advice(state.risk_level, &state.portfolio),
                );
            }
            ToolRequest::BudgetAdvice { .. } => {
                return local_result(
                    intent,
                    parameters,
                    advice::budget_advice(state.monthly_income, state.monthly_expenses),
                );
            }
        };

        match outcome {
            Ok(outcome) => ToolResult::new(intent, parameters, outcome),
            Err(e) => {
                let (kind, reason) = describe_failure(&e);
                ToolResult::failed(intent, parameters, kind, reason)
            }
        }
    }

    /// Quote first; company profile and dividends only once the quote is in.
    /// Those two are single best-effort attempts and never fail the analysis.
    async fn analyze_stock(&self, ticker: &str) -> crate::Result<StockAnalysis> {
        let quote = self
            .with_retry("stock_quote", move || self.provider.get_quote(ticker))
            .await?;
        let symbol = quote.symbol.clone();

        let (profile, dividends) = tokio::join!(
            self.provider.get_company_profile(&symbol),
            self.provider.get_dividends(&symbol)
        );

        Ok(StockAnalysis {
            quote,
            profile: optional(&symbol, "company profile", profile),
            dividends: optional(&symbol, "dividends", dividends),
        })
    }

    /// USD against the default targets. Missing rates are skipped; fails only
    /// when none could be fetched.
    async fn default_rates(&self) -> crate::Result<RateTable> {
        let lookups = DEFAULT_FX_TARGETS.iter().map(|target| {
            self.with_retry("currency_conversion", move || {
                self.provider.get_exchange_rate(DEFAULT_FX_BASE, target)
            })
        });

        let mut rates = Vec::new();
        let mut first_error = None;
        for result in join_all(lookups).await {
            match result {
                Ok(rate) => rates.push(rate),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if rates.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                ChatError::DataUnavailable("no exchange rates available".to_string())
            }));
        }

        Ok(RateTable {
            base: DEFAULT_FX_BASE.to_string(),
            rates,
            as_of: Utc::now(),
        })
    }

    /// Retry timeouts and provider errors with linear backoff.
    /// Unknown symbols are final.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = crate::Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Provider call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(operation, attempt, "Provider call failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

fn is_retryable(error: &ChatError) -> bool {
    matches!(
        error,
        ChatError::ProviderTimeout(_) | ChatError::ProviderError(_)
    )
}

fn optional<T>(symbol: &str, what: &str, result: crate::Result<T>) -> Option<T> {
    result
        .map_err(|e| debug!(symbol, what, "Skipping enrichment: {}", e))
        .ok()
}

fn describe_failure(error: &ChatError) -> (FailureKind, String) {
    match error {
        ChatError::DataUnavailable(detail) => (FailureKind::DataUnavailable, detail.clone()),
        ChatError::ProviderTimeout(_) => (
            FailureKind::Timeout,
            "the market data provider timed out".to_string(),
        ),
        _ => (
            FailureKind::Provider,
            "the market data provider returned an error".to_string(),
        ),
    }
}

fn local_result(
    intent: crate::models::ToolIntent,
    parameters: serde_json::Value,
    advice: Result<String, String>,
) -> ToolResult {
    match advice {
        Ok(text) => ToolResult::new(intent, parameters, ToolOutcome::Recommendation { text }),
        Err(reason) => ToolResult::failed(intent, parameters, FailureKind::MissingParameters, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayFailure, MockMarketData};
    use crate::models::{PortfolioAllocation, RiskLevel, ToolIntent, UserProfile};

    fn state() -> FinancialState {
        FinancialState::from_profile(UserProfile {
            name: "Ada".to_string(),
            portfolio: PortfolioAllocation::new(80.0, 10.0, 10.0),
            risk_level: RiskLevel::Aggressive,
        })
    }

    fn dispatcher(provider: Arc<MockMarketData>, max_attempts: u32) -> ToolDispatcher {
        ToolDispatcher::new(provider, max_attempts).with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_stock_quote() {
        let provider = Arc::new(MockMarketData::new().with_quote("AAPL", 150.25));
        let dispatcher = dispatcher(provider, 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("What's AAPL trading at?", &mut state)
            .await
            .unwrap();

        assert_eq!(result.intent, ToolIntent::StockQuote);
        assert!(result.is_success());
        assert!(result.citation().contains("150.25"));
        assert!(result.citation().contains("Apple Inc., Technology"));
        assert!(result.citation().contains("pays dividends"));
        assert_eq!(state.last_tool_result, Some(result));
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_quote() {
        let provider = Arc::new(MockMarketData::new().with_quote("XYZ", 12.5));
        let dispatcher = dispatcher(provider.clone(), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("price of XYZ", &mut state)
            .await
            .unwrap();

        match &result.outcome {
            ToolOutcome::Stock(analysis) => {
                assert_eq!(analysis.quote.price, 12.5);
                assert!(analysis.profile.is_none());
                assert!(analysis.dividends.as_ref().is_some_and(|d| !d.pays_dividends()));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_price_history() {
        let provider = Arc::new(MockMarketData::new().with_quote("MSFT", 410.5));
        let dispatcher = dispatcher(provider, 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("How has MSFT performed over the last month?", &mut state)
            .await
            .unwrap();

        assert_eq!(result.intent, ToolIntent::PriceHistory);
        assert_eq!(result.parameters["range"], "1mo");
        assert_eq!(result.key_figure().as_deref(), Some("410.50"));
        assert!(result.citation().contains("over the past month (+10.00%)"));
    }

    #[tokio::test]
    async fn test_no_intent() {
        let dispatcher = dispatcher(Arc::new(MockMarketData::new()), 2);
        let mut state = state();

        assert!(dispatcher.classify_and_run("hello!", &mut state).await.is_none());
        assert!(state.last_tool_result.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let provider = Arc::new(MockMarketData::new());
        provider.push_failure(GatewayFailure::Timeout).await;
        let dispatcher = dispatcher(provider.clone(), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("price of AAPL", &mut state)
            .await
            .unwrap();

        assert!(result.is_success());
        // two quote attempts, then profile and dividends
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_timeout_exhausts_attempts() {
        let provider = Arc::new(MockMarketData::new());
        provider.push_failure(GatewayFailure::Timeout).await;
        provider.push_failure(GatewayFailure::Timeout).await;
        let dispatcher = dispatcher(provider.clone(), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("price of AAPL", &mut state)
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            ToolOutcome::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        ));
        assert!(result.citation().contains("unavailable"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol_not_retried() {
        let provider = Arc::new(MockMarketData::new());
        let dispatcher = dispatcher(provider.clone(), 3);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("price of ZZZZ", &mut state)
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            ToolOutcome::Failed {
                kind: FailureKind::DataUnavailable,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let provider = Arc::new(MockMarketData::new());
        let dispatcher = dispatcher(provider.clone(), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("what is the share price?", &mut state)
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            ToolOutcome::Failed {
                kind: FailureKind::MissingParameters,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_currency_conversion() {
        let dispatcher = dispatcher(Arc::new(MockMarketData::new()), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("convert 100 USD to EUR", &mut state)
            .await
            .unwrap();

        match &result.outcome {
            ToolOutcome::Conversion(conversion) => {
                assert!((conversion.converted - 92.0).abs() < 1e-9)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(result.key_figure().as_deref(), Some("92.00"));
    }

    #[tokio::test]
    async fn test_currency_without_pair_lists_default_rates() {
        let provider = Arc::new(MockMarketData::new());
        let dispatcher = dispatcher(provider.clone(), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("what are today's exchange rates?", &mut state)
            .await
            .unwrap();

        match &result.outcome {
            ToolOutcome::Rates(table) => {
                assert_eq!(table.base, "USD");
                let quotes: Vec<&str> = table.rates.iter().map(|r| r.quote.as_str()).collect();
                assert_eq!(quotes, DEFAULT_FX_TARGETS.to_vec());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(result.citation().starts_with("1 USD = 0.9200 EUR"));
        assert_eq!(provider.call_count(), DEFAULT_FX_TARGETS.len());
    }

    #[tokio::test]
    async fn test_budget_advice_stores_figures() {
        let dispatcher = dispatcher(Arc::new(MockMarketData::new()), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("My income is 5000 and expenses are 4000, help me budget", &mut state)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(state.monthly_income, Some(5000.0));
        assert_eq!(state.monthly_expenses, Some(4000.0));
        assert!(result.citation().contains("20.0%"));
    }

    #[tokio::test]
    async fn test_portfolio_advice() {
        let dispatcher = dispatcher(Arc::new(MockMarketData::new()), 2);
        let mut state = state();

        let result = dispatcher
            .classify_and_run("How should I rebalance my portfolio?", &mut state)
            .await
            .unwrap();

        assert_eq!(result.intent, ToolIntent::PortfolioAdvice);
        assert!(result.citation().contains("aggressive"));
    }
}
