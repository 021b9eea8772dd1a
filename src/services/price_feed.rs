//! SOL/USD price feed
//!
//! Thin client over the Jupiter price API. Purely advisory: analytics use it
//! to annotate SOL values with a USD figure, and everything keeps working
//! when the feed is down. The last good price is served while the API is
//! unreachable.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::CONFIG;
use crate::error::EngineError;
use crate::services::SOL_MINT;

const PRICE_CACHE_TTL: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Spot SOL/USD, best effort. None when no price has ever been fetched.
    async fn sol_price_usd(&self) -> Option<f64>;
}

pub struct JupiterPriceFeed {
    http: reqwest::Client,
    base_url: String,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl JupiterPriceFeed {
    pub fn new() -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONFIG.execution.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: CONFIG.aggregator.price_api_url.clone(),
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<f64, EngineError> {
        let url = format!("{}?ids={}", self.base_url, SOL_MINT);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(EngineError::Aggregator(format!(
                "price API HTTP {}",
                response.status()
            )));
        }
        let json: Value = response.json().await?;
        parse_sol_price(&json)
            .ok_or_else(|| EngineError::Aggregator("SOL price missing from response".to_string()))
    }

    fn cached_price(&self, max_age: Option<Duration>) -> Option<f64> {
        let cached = self.cached.lock().ok()?;
        let (price, fetched_at) = (*cached)?;
        match max_age {
            Some(max_age) if fetched_at.elapsed() > max_age => None,
            _ => Some(price),
        }
    }

    fn store(&self, price: f64) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((price, Instant::now()));
        }
    }
}

#[async_trait]
impl PriceFeed for JupiterPriceFeed {
    async fn sol_price_usd(&self) -> Option<f64> {
        if let Some(price) = self.cached_price(Some(PRICE_CACHE_TTL)) {
            return Some(price);
        }
        match self.fetch().await {
            Ok(price) => {
                self.store(price);
                Some(price)
            }
            Err(e) => {
                warn!("Failed to refresh SOL price: {}", e);
                // stale beats nothing for display purposes
                self.cached_price(None)
            }
        }
    }
}

/// The price API quotes prices as decimal strings; older deployments used
/// raw numbers. Accept both.
fn parse_sol_price(json: &Value) -> Option<f64> {
    let price = json.get("data")?.get(SOL_MINT)?.get("price")?;
    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_prices() {
        let body = json!({
            "data": {
                SOL_MINT: { "id": SOL_MINT, "type": "derivedPrice", "price": "184.201577" }
            },
            "timeTaken": 0.003
        });
        assert_eq!(parse_sol_price(&body), Some(184.201577));
    }

    #[test]
    fn parses_numeric_prices() {
        let body = json!({ "data": { SOL_MINT: { "price": 97.5 } } });
        assert_eq!(parse_sol_price(&body), Some(97.5));
    }

    #[test]
    fn missing_data_yields_none() {
        assert_eq!(parse_sol_price(&json!({})), None);
        assert_eq!(parse_sol_price(&json!({ "data": {} })), None);
        assert_eq!(
            parse_sol_price(&json!({ "data": { SOL_MINT: { "price": "abc" } } })),
            None
        );
    }
}
