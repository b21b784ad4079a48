use anyhow::{bail, Context, Result};
use std::env;

pub const DEFAULT_TICKERS: &str = "SPY,GOOG,NVDA,TSLA,WMT";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Default symbol list, order preserved
    pub tickers: Vec<String>,
    pub cache_ttl_secs: i64,
    pub max_tickers: usize,
    pub quote_base_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let tickers = parse_tickers(&env::var("VALUATION_TICKERS").unwrap_or_else(|_| DEFAULT_TICKERS.to_string()))
            .context("VALUATION_TICKERS is invalid")?;

        let config = Self {
            bind_addr: env::var("VALUATION_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            tickers,
            cache_ttl_secs: env::var("VALUATION_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("VALUATION_CACHE_TTL_SECS must be an integer")?,
            max_tickers: env::var("VALUATION_MAX_TICKERS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("VALUATION_MAX_TICKERS must be an integer")?,
            quote_base_url: env::var("QUOTE_API_BASE_URL")
                .unwrap_or_else(|_| quote_client::DEFAULT_BASE_URL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            bail!("At least one ticker must be configured");
        }
        if self.cache_ttl_secs < 0 {
            bail!("VALUATION_CACHE_TTL_SECS must not be negative");
        }
        if self.tickers.len() > self.max_tickers {
            bail!("{} tickers configured, limit is {}", self.tickers.len(), self.max_tickers);
        }
        Ok(())
    }
}

/// Split a comma-separated symbol list: trimmed, uppercased, first occurrence wins.
pub fn parse_tickers(raw: &str) -> Result<Vec<String>> {
    let mut tickers: Vec<String> = Vec::new();

    for part in raw.split(',') {
        let symbol = part.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        {
            bail!("Invalid ticker symbol: {}", symbol);
        }
        if !tickers.contains(&symbol) {
            tickers.push(symbol);
        }
    }

    Ok(tickers)
}
