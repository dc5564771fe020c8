//! Core data models for the chat relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ChatError;

//
// ================= Identity =================
//

/// Identity of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

//
// ================= Profile =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "low")]
    Conservative,
    #[default]
    #[serde(alias = "medium")]
    Moderate,
    #[serde(alias = "high")]
    Aggressive,
}

impl FromStr for RiskLevel {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" | "low" => Ok(RiskLevel::Conservative),
            "moderate" | "medium" => Ok(RiskLevel::Moderate),
            "aggressive" | "high" => Ok(RiskLevel::Aggressive),
            other => Err(ChatError::InvalidMessage(format!(
                "unknown risk level '{}' (expected conservative, moderate or aggressive)",
                other
            ))),
        }
    }
}

/// Declared allocation in percent. Advisory only: the parts need not sum to 100.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAllocation {
    #[serde(default)]
    pub stocks: f64,
    #[serde(default)]
    pub bonds: f64,
    #[serde(default)]
    pub cash: f64,
}

impl PortfolioAllocation {
    pub fn new(stocks: f64, bonds: f64, cash: f64) -> Self {
        Self { stocks, bonds, cash }
    }

    pub fn total(&self) -> f64 {
        self.stocks + self.bonds + self.cash
    }

    pub fn is_empty(&self) -> bool {
        self.total() <= 0.0
    }
}

/// Profile declared by the client in its `init` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default = "default_display_name")]
    pub name: String,
    #[serde(default, rename = "investment_portfolio")]
    pub portfolio: PortfolioAllocation,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

fn default_display_name() -> String {
    "User".to_string()
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: default_display_name(),
            portfolio: PortfolioAllocation::default(),
            risk_level: RiskLevel::default(),
        }
    }
}

//
// ================= Financial State =================
//

/// Per-session financial record: declared profile plus gathered tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialState {
    pub name: String,
    pub risk_level: RiskLevel,
    pub portfolio: PortfolioAllocation,
    pub monthly_income: Option<f64>,
    pub monthly_expenses: Option<f64>,
    pub last_tool_result: Option<ToolResult>,
}

impl FinancialState {
    pub fn from_profile(profile: UserProfile) -> Self {
        Self {
            name: profile.name,
            risk_level: profile.risk_level,
            portfolio: profile.portfolio,
            monthly_income: None,
            monthly_expenses: None,
            last_tool_result: None,
        }
    }

    /// Replace the declared profile, keeping budget figures and tool output.
    pub fn apply_profile(&mut self, profile: UserProfile) {
        self.name = profile.name;
        self.risk_level = profile.risk_level;
        self.portfolio = profile.portfolio;
    }
}

//
// ================= Market Records =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    pub previous_close: Option<f64>,
    pub change_percent: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Company identity as reported by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyProfile {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// Dividends paid over the trailing twelve months
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DividendSummary {
    pub symbol: String,
    pub payments: usize,
    pub trailing_annual: f64,
    pub last_amount: Option<f64>,
    pub last_paid: Option<DateTime<Utc>>,
}

impl DividendSummary {
    pub fn none(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            payments: 0,
            trailing_annual: 0.0,
            last_amount: None,
            last_paid: None,
        }
    }

    pub fn pays_dividends(&self) -> bool {
        self.payments > 0 && self.trailing_annual > 0.0
    }

    /// Trailing yield against `price`, in percent
    pub fn yield_percent(&self, price: f64) -> Option<f64> {
        (self.pays_dividends() && price > 0.0).then(|| self.trailing_annual / price * 100.0)
    }
}

/// Quote plus whatever company and dividend data could be gathered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockAnalysis {
    pub quote: Quote,
    pub profile: Option<CompanyProfile>,
    pub dividends: Option<DividendSummary>,
}

impl StockAnalysis {
    pub fn from_quote(quote: Quote) -> Self {
        Self {
            quote,
            profile: None,
            dividends: None,
        }
    }
}

/// Lookback window for a price history
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRange {
    FiveDays,
    #[default]
    OneMonth,
    ThreeMonths,
    SixMonths,
    YearToDate,
    OneYear,
    FiveYears,
}

impl HistoryRange {
    /// Provider range code
    pub fn code(&self) -> &'static str {
        match self {
            HistoryRange::FiveDays => "5d",
            HistoryRange::OneMonth => "1mo",
            HistoryRange::ThreeMonths => "3mo",
            HistoryRange::SixMonths => "6mo",
            HistoryRange::YearToDate => "ytd",
            HistoryRange::OneYear => "1y",
            HistoryRange::FiveYears => "5y",
        }
    }

    /// Sampling interval code; long ranges are sampled weekly
    pub fn interval(&self) -> &'static str {
        match self {
            HistoryRange::FiveYears => "1wk",
            _ => "1d",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HistoryRange::FiveDays => "the past 5 days",
            HistoryRange::OneMonth => "the past month",
            HistoryRange::ThreeMonths => "the past 3 months",
            HistoryRange::SixMonths => "the past 6 months",
            HistoryRange::YearToDate => "the year to date",
            HistoryRange::OneYear => "the past year",
            HistoryRange::FiveYears => "the past 5 years",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub close: f64,
}

/// Closing prices over a range, oldest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistory {
    pub symbol: String,
    pub range: HistoryRange,
    pub currency: String,
    pub points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn change_percent(&self) -> Option<f64> {
        let last = self.last()?.close;
        percent_between(self.first()?.close, last)
    }

    pub fn high(&self) -> Option<f64> {
        self.points.iter().map(|p| p.close).reduce(f64::max)
    }

    pub fn low(&self) -> Option<f64> {
        self.points.iter().map(|p| p.close).reduce(f64::min)
    }
}

fn percent_between(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| (to - from) / from * 100.0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSnapshot {
    pub symbol: String,
    pub name: String,
    pub value: f64,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketOverview {
    pub indices: Vec<IndexSnapshot>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRate {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

/// Rates from one base currency against several others
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateTable {
    pub base: String,
    pub rates: Vec<ExchangeRate>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyConversion {
    pub rate: ExchangeRate,
    pub amount: f64,
    pub converted: f64,
}

//
// ================= Tool Results =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolIntent {
    StockQuote,
    PriceHistory,
    MarketOverview,
    CurrencyConversion,
    PortfolioAdvice,
    BudgetAdvice,
}

impl ToolIntent {
    /// Name reported in the outbound `action` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolIntent::StockQuote => "stock_quote",
            ToolIntent::PriceHistory => "price_history",
            ToolIntent::MarketOverview => "market_overview",
            ToolIntent::CurrencyConversion => "currency_conversion",
            ToolIntent::PortfolioAdvice => "portfolio_advice",
            ToolIntent::BudgetAdvice => "budget_advice",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingParameters,
    DataUnavailable,
    Timeout,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Stock(StockAnalysis),
    History(PriceHistory),
    MarketOverview(MarketOverview),
    Conversion(CurrencyConversion),
    Rates(RateTable),
    Recommendation { text: String },
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub intent: ToolIntent,
    pub parameters: serde_json::Value,
    pub outcome: ToolOutcome,
    pub fetched_at: DateTime<Utc>,
}

impl ToolResult {
    pub fn new(intent: ToolIntent, parameters: serde_json::Value, outcome: ToolOutcome) -> Self {
        Self {
            intent,
            parameters,
            outcome,
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(
        intent: ToolIntent,
        parameters: serde_json::Value,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            intent,
            parameters,
            ToolOutcome::Failed {
                kind,
                reason: reason.into(),
            },
        )
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ToolOutcome::Failed { .. })
    }

    /// The figure a reply must mention for the data to count as surfaced.
    pub fn key_figure(&self) -> Option<String> {
        match &self.outcome {
            ToolOutcome::Stock(analysis) => Some(format!("{:.2}", analysis.quote.price)),
            ToolOutcome::History(history) => history.last().map(|p| format!("{:.2}", p.close)),
            ToolOutcome::MarketOverview(overview) => {
                overview.indices.first().map(|i| format!("{:.2}", i.value))
            }
            ToolOutcome::Conversion(conversion) => Some(format!("{:.2}", conversion.converted)),
            ToolOutcome::Rates(table) => table.rates.first().map(|r| format!("{:.4}", r.rate)),
            ToolOutcome::Recommendation { .. } => None,
            ToolOutcome::Failed { .. } => Some("unavailable".to_string()),
        }
    }

    /// One-line, human-readable rendering of the result.
    pub fn citation(&self) -> String {
        match &self.outcome {
            ToolOutcome::Stock(analysis) => stock_citation(analysis),
            ToolOutcome::History(history) => history_citation(history),
            ToolOutcome::MarketOverview(overview) => {
                let parts: Vec<String> = overview
                    .indices
                    .iter()
                    .map(|index| match index.change_percent {
                        Some(change) => format!("{} {:.2} ({:+.2}%)", index.name, index.value, change),
                        None => format!("{} {:.2}", index.name, index.value),
                    })
                    .collect();
                format!("Market snapshot: {}.", parts.join(", "))
            }
            ToolOutcome::Conversion(conversion) => format!(
                "1 {} = {:.4} {}, so {:.2} {} is about {:.2} {}.",
                conversion.rate.base,
                conversion.rate.rate,
                conversion.rate.quote,
                conversion.amount,
                conversion.rate.base,
                conversion.converted,
                conversion.rate.quote
            ),
            ToolOutcome::Rates(table) => {
                let parts: Vec<String> = table
                    .rates
                    .iter()
                    .map(|r| format!("{:.4} {}", r.rate, r.quote))
                    .collect();
                format!("1 {} = {}.", table.base, parts.join(", "))
            }
            ToolOutcome::Recommendation { text } => text.clone(),
            ToolOutcome::Failed { reason, .. } => {
                format!("Live data is unavailable right now: {}", reason)
            }
        }
    }
}

fn stock_citation(analysis: &StockAnalysis) -> String {
    let quote = &analysis.quote;
    let company = analysis.profile.as_ref().and_then(|profile| {
        let name = profile.name.as_deref()?;
        Some(match profile.sector.as_deref() {
            Some(sector) => format!(" ({}, {})", name, sector),
            None => format!(" ({})", name),
        })
    });

    let mut line = format!(
        "{}{} last traded at {:.2} {}",
        quote.symbol,
        company.unwrap_or_default(),
        quote.price,
        quote.currency
    );
    if let Some(change) = quote.change_percent {
        line.push_str(&format!(" ({:+.2}% on the day)", change));
    }
    line.push_str(&format!(" as of {}.", quote.as_of.format("%Y-%m-%d %H:%M UTC")));

    match &analysis.dividends {
        Some(dividends) if dividends.pays_dividends() => {
            line.push_str(&format!(
                " It pays dividends ({:.2} {} over the last 12 months",
                dividends.trailing_annual, quote.currency
            ));
            if let Some(yield_percent) = dividends.yield_percent(quote.price) {
                line.push_str(&format!(", about {:.2}% yield", yield_percent));
            }
            line.push_str("), which could provide regular income.");
        }
        Some(_) => line.push_str(" It has paid no dividends in the last 12 months."),
        None => {}
    }

    line
}

fn history_citation(history: &PriceHistory) -> String {
    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        return format!("No price history for {} over {}.", history.symbol, history.range.label());
    };

    let mut line = format!(
        "{} moved from {:.2} to {:.2} {} over {}",
        history.symbol,
        first.close,
        last.close,
        history.currency,
        history.range.label()
    );
    if let Some(change) = history.change_percent() {
        line.push_str(&format!(" ({:+.2}%)", change));
    }
    if let (Some(low), Some(high)) = (history.low(), history.high()) {
        line.push_str(&format!(", trading between {:.2} and {:.2}", low, high));
    }
    line.push('.');
    line
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Conservative => "conservative",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Aggressive => "aggressive",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ToolIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
