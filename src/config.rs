//! Runtime configuration
//!
//! Everything is read from the process environment (optionally seeded from a
//! `.env` file by the binaries).

use crate::error::ChatError;
use crate::memory::MemoryConfig;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Attempts per tool call, counting the first one.
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub market_data: MarketDataConfig,
    pub memory: MemoryConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_value("PORT", &raw)?,
            Err(_) => 8000,
        };

        let llm = LlmConfig {
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 30)?),
        };

        let market_data = MarketDataConfig {
            base_url: env::var("MARKET_DATA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MARKET_DATA_BASE_URL.to_string()),
            timeout: Duration::from_secs(env_or("MARKET_DATA_TIMEOUT_SECS", 10)?),
            max_attempts: env_or("TOOL_MAX_ATTEMPTS", 2)?,
        };

        let defaults = MemoryConfig::default();
        let memory = MemoryConfig::new(
            env_or("MEMORY_WINDOW_SIZE", defaults.window_size)?,
            env_or("MEMORY_KEEP_RECENT", defaults.keep_recent)?,
        );

        Ok(Self {
            port,
            llm,
            market_data,
            memory,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ChatError::ConfigError(format!("{} has an invalid value: {:?}", key, raw)))
}
