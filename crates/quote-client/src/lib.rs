use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use valuation_core::{FundamentalsSource, RawFields, ValuationError};

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// quoteSummary modules to request. Earlier modules win when a key repeats.
pub const SUMMARY_MODULES: &[&str] = &["financialData", "summaryDetail", "defaultKeyStatistics"];

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

            // Wait for the oldest request to leave the window
            let oldest = ts.front().copied().unwrap_or(now);
            let sleep_dur = (oldest + self.window).saturating_duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for quote API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct QuoteClient {
    base_url: String,
    crumb: Option<String>,
    client: Client,
    rate_limiter: RateLimiter,
}

impl QuoteClient {
    pub fn new(base_url: String) -> Self {
        // The public endpoint throttles aggressively; 60/min stays well under it.
        let rate_limit: usize = std::env::var("QUOTE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let crumb = std::env::var("QUOTE_API_CRUMB").ok().filter(|c| !c.is_empty());

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("valuation-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            crumb,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn with_rate_limit(mut self, max_per_minute: usize) -> Self {
        self.rate_limiter = RateLimiter::new(max_per_minute, Duration::from_secs(60));
        self
    }

    pub fn with_crumb(mut self, crumb: Option<String>) -> Self {
        self.crumb = crumb;
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ValuationError> {
        let request = builder.build().map_err(|e| ValuationError::Api(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| ValuationError::Api("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| ValuationError::Api(e.to_string()))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let wait_secs = 10u64;
            tracing::warn!("Quote API 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(ValuationError::Api("Rate limited by quote API after 3 retries".to_string()))
    }

    /// Get the flattened quote summary fields for a symbol
    pub async fn get_quote_summary(&self, symbol: &str) -> Result<RawFields, ValuationError> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        let modules = SUMMARY_MODULES.join(",");

        let mut query = vec![("modules", modules)];
        if let Some(crumb) = &self.crumb {
            query.push(("crumb", crumb.clone()));
        }

        let response = self.send_request(self.client.get(&url).query(&query)).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ValuationError::NotFound(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(ValuationError::Api(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ValuationError::Api(e.to_string()))?;

        parse_quote_summary(symbol, &body)
    }
}

#[async_trait]
impl FundamentalsSource for QuoteClient {
    async fn fetch_fields(&self, symbol: &str) -> Result<RawFields, ValuationError> {
        self.get_quote_summary(symbol).await
    }
}

/// Decode a quoteSummary response body into a flat field map.
pub fn parse_quote_summary(symbol: &str, body: &str) -> Result<RawFields, ValuationError> {
    let envelope: QuoteSummaryEnvelope =
        serde_json::from_str(body).map_err(|e| ValuationError::Api(format!("Malformed payload: {}", e)))?;

    if let Some(err) = envelope.quote_summary.error {
        let description = err.description.unwrap_or_default();
        return match err.code.as_deref() {
            Some("Not Found") => Err(ValuationError::NotFound(symbol.to_string())),
            code => Err(ValuationError::Api(format!(
                "{}: {}",
                code.unwrap_or("error"),
                description
            ))),
        };
    }

    envelope
        .quote_summary
        .result
        .unwrap_or_default()
        .first()
        .map(flatten_quote_summary)
        .ok_or_else(|| ValuationError::NotFound(symbol.to_string()))
}

/// Merge the requested modules into one field map, unwrapping `{raw, fmt}` objects.
pub fn flatten_quote_summary(result: &Value) -> RawFields {
    let mut fields = RawFields::new();

    for module in SUMMARY_MODULES {
        let Some(Value::Object(map)) = result.get(*module) else {
            continue;
        };
        for (key, value) in map {
            let value = unwrap_raw(value);
            // Earliest non-null value wins; null only fills a gap
            let claimed = fields.get(key).is_some_and(|v| !v.is_null());
            if !claimed && (!value.is_null() || !fields.contains_key(key)) {
                fields.insert(key.clone(), value);
            }
        }
    }

    fields
}

fn unwrap_raw(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.is_empty() => Value::Null,
        Value::Object(map) => map.get("raw").cloned().unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<QuoteSummaryError>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryError {
    code: Option<String>,
    description: Option<String>,
}
