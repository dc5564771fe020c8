//! Intent Classifier
//!
//! Keyword scoring decides which tool, if any, a message asks for:
//! - StockQuote: "price of AAPL", "what's Tesla trading at?"
//! - PriceHistory: "how has MSFT performed over the last 6 months?"
//! - MarketOverview: "how is the stock market doing?", "how's the Dow?"
//! - CurrencyConversion: "convert 100 USD to EUR", "100 dollars in euros"
//! - PortfolioAdvice / BudgetAdvice: "how should I invest?", "help me budget"
//!
//! Parameters are pulled out best-effort; a matched intent with missing
//! parameters is still returned so the dispatcher can explain what is missing.

use crate::models::{HistoryRange, ToolIntent};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

/// A classified tool call with whatever parameters could be extracted
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    StockQuote {
        ticker: Option<String>,
    },
    PriceHistory {
        ticker: Option<String>,
        range: HistoryRange,
    },
    MarketOverview,
    CurrencyConversion {
        pair: Option<(String, String)>,
        amount: f64,
    },
    PortfolioAdvice,
    BudgetAdvice {
        income: Option<f64>,
        expenses: Option<f64>,
    },
}

impl ToolRequest {
    pub fn intent(&self) -> ToolIntent {
        match self {
            ToolRequest::StockQuote { .. } => ToolIntent::StockQuote,
            ToolRequest::PriceHistory { .. } => ToolIntent::PriceHistory,
            ToolRequest::MarketOverview => ToolIntent::MarketOverview,
            ToolRequest::CurrencyConversion { .. } => ToolIntent::CurrencyConversion,
            ToolRequest::PortfolioAdvice => ToolIntent::PortfolioAdvice,
            ToolRequest::BudgetAdvice { .. } => ToolIntent::BudgetAdvice,
        }
    }

    /// Parameters as recorded on the tool result
    pub fn parameters(&self) -> Value {
        match self {
            ToolRequest::StockQuote { ticker } => json!({ "ticker": ticker }),
            ToolRequest::PriceHistory { ticker, range } => {
                json!({ "ticker": ticker, "range": range.code() })
            }
            ToolRequest::MarketOverview => json!({}),
            ToolRequest::CurrencyConversion { pair, amount } => match pair {
                Some((base, quote)) => json!({ "base": base, "quote": quote, "amount": amount }),
                None => json!({ "amount": amount }),
            },
            ToolRequest::PortfolioAdvice => json!({}),
            ToolRequest::BudgetAdvice { income, expenses } => {
                json!({ "income": income, "expenses": expenses })
            }
        }
    }
}

/// Static keyword lists
const STOCK_KEYWORDS: &[&str] = &[
    "price", "quote", "trading at", "trading", "share price", "shares", "stock price",
    "ticker", "worth", "valued", "market cap",
];

const HISTORY_KEYWORDS: &[&str] = &[
    "history", "historical", "performance", "performed", "perform", "over the last",
    "over the past", "trend", "since", "ytd", "year to date",
];

const MARKET_KEYWORDS: &[&str] = &[
    "market", "stock market", "market overview", "markets", "market today", "index",
    "indices", "s&p", "dow", "nasdaq",
];

/// Index names; naming one is a strong overview signal
const INDEX_NAMES: &[&str] = &["s&p", "s&p 500", "dow", "dow jones", "nasdaq"];

const CURRENCY_KEYWORDS: &[&str] = &[
    "convert", "conversion", "exchange rate", "exchange", "currency", "currencies", "forex",
    "fx",
];

const PORTFOLIO_KEYWORDS: &[&str] = &[
    "portfolio", "invest", "investing", "investment", "allocation", "allocate", "rebalance",
    "diversify",
];

const BUDGET_KEYWORDS: &[&str] = &[
    "budget", "budgeting", "expense", "expenses", "income", "saving", "savings", "save",
    "spending",
];

/// ISO 4217 codes accepted in currency pairs
const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "CNY", "HKD", "SGD", "INR",
    "KRW", "SEK", "NOK", "DKK", "PLN", "CZK", "HUF", "MXN", "BRL", "ZAR", "TRY", "RUB",
    "AED", "SAR", "ILS", "THB", "IDR", "MYR", "PHP",
];

/// Currency names accepted in place of an ISO code
const CURRENCY_NAMES: &[(&str, &str)] = &[
    ("dollar", "USD"),
    ("dollars", "USD"),
    ("bucks", "USD"),
    ("euro", "EUR"),
    ("euros", "EUR"),
    ("pound", "GBP"),
    ("pounds", "GBP"),
    ("sterling", "GBP"),
    ("yen", "JPY"),
    ("yuan", "CNY"),
    ("renminbi", "CNY"),
    ("rupee", "INR"),
    ("rupees", "INR"),
    ("franc", "CHF"),
    ("francs", "CHF"),
    ("peso", "MXN"),
    ("pesos", "MXN"),
];

/// Uppercase words that look like tickers but are not
const TICKER_STOPWORDS: &[&str] = &[
    "I", "A", "AM", "PM", "OK", "CEO", "CFO", "ETF", "IPO", "IRA", "USA", "US", "UK", "EU",
    "GDP", "FAQ", "API", "AI", "ROI", "YTD", "EPS", "PE", "S", "P", "FX", "TO", "IN", "IS",
    "IT", "OF", "THE", "AND", "OR", "MY", "ME", "DO", "WHAT", "HOW", "NOW",
];

/// Company names resolved when no ticker symbol is written
const COMPANY_ALIASES: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("nvidia", "NVDA"),
    ("facebook", "META"),
    ("netflix", "NFLX"),
    ("berkshire", "BRK-B"),
];

lazy_static! {
    static ref CASHTAG: Regex = Regex::new(r"\$([A-Za-z]{1,5})\b").unwrap();
    static ref UPPER_TICKER: Regex = Regex::new(r"\b([A-Z]{1,5})\b").unwrap();
    static ref CURRENCY_PAIR: Regex = Regex::new(
        r"(?i)(?:(\d[\d,]*(?:\.\d+)?)\s*)?\b([a-z]{3,8})\b\s*(?:to|into|in|/)\s*\b([a-z]{3,8})\b"
    )
    .unwrap();
    static ref AMOUNT: Regex = Regex::new(r"(\d[\d,]*(?:\.\d+)?)").unwrap();
    static ref INCOME: Regex =
        Regex::new(r"(?i)(?:income|earn|make)\D{0,20}?(\d[\d,]*(?:\.\d+)?)").unwrap();
    static ref LOOKBACK: Regex = Regex::new(
        r"(?i)\b(?:(\d+|one|two|three|six|five)\s*)?(day|week|month|quarter|year)s?\b"
    )
    .unwrap();
    static ref EXPENSES: Regex =
        Regex::new(r"(?i)(?:expenses?|spend|spending)\D{0,20}?(\d[\d,]*(?:\.\d+)?)").unwrap();
}

/// Keyword-scoring intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a chat message. `None` for no match or an ambiguous one.
    pub fn classify(message: &str) -> Option<ToolRequest> {
        let lower = message.to_lowercase();
        let ticker = extract_ticker(message);
        let pair = extract_currency_pair(message);

        let mut scores = [
            (ToolIntent::StockQuote, keyword_score(&lower, STOCK_KEYWORDS)),
            (ToolIntent::PriceHistory, keyword_score(&lower, HISTORY_KEYWORDS)),
            (ToolIntent::MarketOverview, keyword_score(&lower, MARKET_KEYWORDS)),
            (
                ToolIntent::CurrencyConversion,
                keyword_score(&lower, CURRENCY_KEYWORDS),
            ),
            (
                ToolIntent::PortfolioAdvice,
                keyword_score(&lower, PORTFOLIO_KEYWORDS),
            ),
            (ToolIntent::BudgetAdvice, keyword_score(&lower, BUDGET_KEYWORDS)),
        ];

        // Structural evidence only reinforces an intent already hinted at
        for (intent, score) in scores.iter_mut() {
            match intent {
                ToolIntent::StockQuote if *score > 0 && ticker.is_some() => *score += 1,
                ToolIntent::StockQuote if CASHTAG.is_match(message) => *score += 1,
                ToolIntent::PriceHistory if *score > 0 && ticker.is_some() => {
                    *score += 1 + usize::from(extract_range(&lower).is_some())
                }
                ToolIntent::MarketOverview if ticker.is_none() && names_index(&lower) => {
                    *score += 2
                }
                ToolIntent::CurrencyConversion if pair.is_some() => *score += 2,
                _ => {}
            }
        }

        let best = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
        if best == 0 {
            return None;
        }

        let mut winners = scores.iter().filter(|(_, score)| *score == best);
        let (intent, _) = winners.next()?;
        if winners.next().is_some() {
            return None;
        }

        Some(match intent {
            ToolIntent::StockQuote => ToolRequest::StockQuote { ticker },
            ToolIntent::PriceHistory => ToolRequest::PriceHistory {
                range: extract_range(&lower).unwrap_or_default(),
                ticker,
            },
            ToolIntent::MarketOverview => ToolRequest::MarketOverview,
            ToolIntent::CurrencyConversion => ToolRequest::CurrencyConversion {
                amount: extract_amount(message, pair.as_ref()),
                pair: pair.map(|(base, quote, _)| (base, quote)),
            },
            ToolIntent::PortfolioAdvice => ToolRequest::PortfolioAdvice,
            ToolIntent::BudgetAdvice => ToolRequest::BudgetAdvice {
                income: capture_number(&INCOME, message),
                expenses: capture_number(&EXPENSES, message),
            },
        })
    }
}

fn keyword_score(text: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|kw| contains_word(text, kw))
        .count()
}

/// Substring match that refuses to split a word ("fx" must not hit "fxyz")
fn contains_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + keyword.len()..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}

fn names_index(text: &str) -> bool {
    INDEX_NAMES.iter().any(|name| contains_word(text, name))
}

fn is_currency_code(code: &str) -> bool {
    CURRENCY_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
}

/// ISO code for a code or currency name ("eur", "euros")
fn currency_code(word: &str) -> Option<String> {
    if is_currency_code(word) {
        return Some(word.to_uppercase());
    }
    let lower = word.to_lowercase();
    CURRENCY_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| code.to_string())
}

/// Ticker from a cashtag, an uppercase symbol, or a known company name
pub fn extract_ticker(message: &str) -> Option<String> {
    if let Some(caps) = CASHTAG.captures(message) {
        return Some(caps[1].to_uppercase());
    }

    let symbol = UPPER_TICKER
        .captures_iter(message)
        .map(|caps| caps[1].to_string())
        .find(|word| !TICKER_STOPWORDS.contains(&word.as_str()) && !is_currency_code(word));
    if symbol.is_some() {
        return symbol;
    }

    let lower = message.to_lowercase();
    COMPANY_ALIASES
        .iter()
        .find(|(name, _)| contains_word(&lower, name))
        .map(|(_, ticker)| ticker.to_string())
}

/// First `<amount>? AAA to BBB` where both sides name known currencies.
/// Returns (base, quote, amount written before the base).
fn extract_currency_pair(message: &str) -> Option<(String, String, Option<f64>)> {
    CURRENCY_PAIR.captures_iter(message).find_map(|caps| {
        let base = currency_code(caps.get(2)?.as_str())?;
        let quote = currency_code(caps.get(3)?.as_str())?;
        if base == quote {
            return None;
        }
        let amount = caps.get(1).and_then(|m| parse_number(m.as_str()));
        Some((base, quote, amount))
    })
}

fn extract_amount(message: &str, pair: Option<&(String, String, Option<f64>)>) -> f64 {
    pair.and_then(|(_, _, amount)| *amount)
        .or_else(|| {
            AMOUNT
                .captures(message)
                .and_then(|caps| parse_number(&caps[1]))
        })
        .filter(|amount| *amount > 0.0)
        .unwrap_or(1.0)
}

/// Lookback window named in the message, snapped to a supported range
fn extract_range(lower: &str) -> Option<HistoryRange> {
    if contains_word(lower, "ytd") || lower.contains("year to date") {
        return Some(HistoryRange::YearToDate);
    }

    let caps = LOOKBACK.captures(lower)?;
    let count: u64 = match caps.get(1).map(|m| m.as_str()) {
        None | Some("one") => 1,
        Some("two") => 2,
        Some("three") => 3,
        Some("five") => 5,
        Some("six") => 6,
        Some(digits) => digits.parse().ok()?,
    };
    let days = count.saturating_mul(match &caps[2] {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "quarter" => 91,
        _ => 365,
    });

    Some(match days {
        0..=7 => HistoryRange::FiveDays,
        8..=45 => HistoryRange::OneMonth,
        46..=120 => HistoryRange::ThreeMonths,
        121..=240 => HistoryRange::SixMonths,
        241..=730 => HistoryRange::OneYear,
        _ => HistoryRange::FiveYears,
    })
}

fn capture_number(pattern: &Regex, message: &str) -> Option<f64> {
    pattern
        .captures(message)
        .and_then(|caps| parse_number(&caps[1]))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_quotes() {
        let cases = vec![
            ("What's AAPL trading at?", "AAPL"),
            ("price of $msft please", "MSFT"),
            ("How much is a Tesla share worth?", "TSLA"),
            ("Give me a quote for NVDA", "NVDA"),
        ];

        for (message, ticker) in cases {
            assert_eq!(
                IntentClassifier::classify(message),
                Some(ToolRequest::StockQuote {
                    ticker: Some(ticker.to_string())
                }),
                "{}",
                message
            );
        }
    }

    #[test]
    fn test_stock_without_ticker() {
        assert_eq!(
            IntentClassifier::classify("what is the share price?"),
            Some(ToolRequest::StockQuote { ticker: None })
        );
    }

    #[test]
    fn test_price_history() {
        let cases = [
            ("How has MSFT performed over the last 6 months?", "MSFT", HistoryRange::SixMonths),
            ("Show me AAPL price history for the past year", "AAPL", HistoryRange::OneYear),
            ("Tesla performance this week", "TSLA", HistoryRange::FiveDays),
            ("NVDA ytd performance", "NVDA", HistoryRange::YearToDate),
            ("What's the trend for GOOGL?", "GOOGL", HistoryRange::OneMonth),
        ];

        for (message, ticker, range) in cases {
            assert_eq!(
                IntentClassifier::classify(message),
                Some(ToolRequest::PriceHistory {
                    ticker: Some(ticker.to_string()),
                    range,
                }),
                "{}",
                message
            );
        }
    }

    #[test]
    fn test_extract_range() {
        assert_eq!(extract_range("over the last 3 months"), Some(HistoryRange::ThreeMonths));
        assert_eq!(extract_range("past two years"), Some(HistoryRange::OneYear));
        assert_eq!(extract_range("past five years"), Some(HistoryRange::FiveYears));
        assert_eq!(extract_range("last quarter"), Some(HistoryRange::ThreeMonths));
        assert_eq!(extract_range("since 10 days ago"), Some(HistoryRange::OneMonth));
        assert_eq!(extract_range("how is it doing"), None);
    }

    #[test]
    fn test_market_overview() {
        let cases = [
            "How are the markets today?",
            "Give me a market overview",
            "Where is the Nasdaq?",
            "How is the stock market doing?",
            "What's the price of the S&P 500?",
            "How is the Dow trading today?",
        ];

        for message in cases {
            assert_eq!(
                IntentClassifier::classify(message),
                Some(ToolRequest::MarketOverview),
                "{}",
                message
            );
        }
    }

    #[test]
    fn test_currency_conversion() {
        assert_eq!(
            IntentClassifier::classify("convert 100 USD to EUR"),
            Some(ToolRequest::CurrencyConversion {
                pair: Some(("USD".to_string(), "EUR".to_string())),
                amount: 100.0,
            })
        );

        assert_eq!(
            IntentClassifier::classify("what's the exchange rate for gbp/jpy"),
            Some(ToolRequest::CurrencyConversion {
                pair: Some(("GBP".to_string(), "JPY".to_string())),
                amount: 1.0,
            })
        );
    }

    #[test]
    fn test_currency_names() {
        assert_eq!(
            IntentClassifier::classify("How much is 100 dollars in euros?"),
            Some(ToolRequest::CurrencyConversion {
                pair: Some(("USD".to_string(), "EUR".to_string())),
                amount: 100.0,
            })
        );
        assert_eq!(
            extract_currency_pair("50 pounds to yen"),
            Some(("GBP".to_string(), "JPY".to_string(), Some(50.0)))
        );
        assert!(extract_currency_pair("100 dollars in savings").is_none());
    }

    #[test]
    fn test_ticker_beats_index_name() {
        assert_eq!(
            IntentClassifier::classify("What's the price of AAPL on the Nasdaq?"),
            Some(ToolRequest::StockQuote {
                ticker: Some("AAPL".to_string())
            })
        );
    }

    #[test]
    fn test_currency_without_pair() {
        assert_eq!(
            IntentClassifier::classify("can you convert currency for me?"),
            Some(ToolRequest::CurrencyConversion {
                pair: None,
                amount: 1.0
            })
        );
    }

    #[test]
    fn test_non_currency_words_are_not_pairs() {
        assert!(extract_currency_pair("how to buy bonds").is_none());
        assert!(extract_currency_pair("1,500 usd into inr").is_some());
    }

    #[test]
    fn test_advice_intents() {
        assert_eq!(
            IntentClassifier::classify("How should I diversify my portfolio?"),
            Some(ToolRequest::PortfolioAdvice)
        );

        assert_eq!(
            IntentClassifier::classify("My income is 5,000 and my expenses are 4000, help me budget"),
            Some(ToolRequest::BudgetAdvice {
                income: Some(5000.0),
                expenses: Some(4000.0),
            })
        );
    }

    #[test]
    fn test_no_match_and_ambiguity() {
        assert_eq!(IntentClassifier::classify("hi there"), None);
        assert_eq!(IntentClassifier::classify("What is an ETF?"), None);
        // one portfolio keyword, one budget keyword
        assert_eq!(IntentClassifier::classify("portfolio or budget?"), None);
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("fx rates", "fx"));
        assert!(!contains_word("fxyz rates", "fx"));
        assert!(contains_word("the s&p today", "s&p"));
    }

    #[test]
    fn test_parameters_json() {
        let request = ToolRequest::StockQuote {
            ticker: Some("AAPL".to_string()),
        };
        assert_eq!(request.parameters()["ticker"], "AAPL");
        assert_eq!(request.intent(), ToolIntent::StockQuote);
    }
}
