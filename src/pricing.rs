use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of the stake-to-cash conversion rate consumed on every join.
pub trait PriceQuote: Send + Sync + std::fmt::Debug {
    fn current_rate(&self) -> f64;
}

/// Constant rate, for tests and offline runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub f64);

impl PriceQuote for FixedRate {
    fn current_rate(&self) -> f64 {
        self.0
    }
}

/// Simple-price shape: `{"<asset>": {"<currency>": rate}}`.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SimplePriceResponse(HashMap<String, HashMap<String, f64>>);

impl SimplePriceResponse {
    fn first_rate(&self) -> Option<f64> {
        self.0
            .values()
            .flat_map(|quotes| quotes.values())
            .copied()
            .find(|rate| rate.is_finite() && *rate > 0.0)
    }
}

/// Last successfully fetched rate. A failed refresh keeps the cached value.
#[derive(Debug)]
pub struct CachedPriceService {
    rate_bits: AtomicU64,
    url: String,
    client: reqwest::Client,
}

impl CachedPriceService {
    pub fn new(url: impl Into<String>, fallback_rate: f64) -> Self {
        Self {
            rate_bits: AtomicU64::new(fallback_rate.to_bits()),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn store(&self, rate: f64) {
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }

    async fn fetch(&self) -> anyhow::Result<f64> {
        let response = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("price request failed")?
            .error_for_status()
            .context("price endpoint returned an error status")?;
        let body: SimplePriceResponse = response
            .json()
            .await
            .context("price response was not simple-price json")?;
        match body.first_rate() {
            Some(rate) => Ok(rate),
            None => bail!("price response carried no usable rate"),
        }
    }

    pub async fn refresh(&self) -> anyhow::Result<f64> {
        let rate = self.fetch().await?;
        self.store(rate);
        Ok(rate)
    }

    pub fn spawn_refresh_loop(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match self.refresh().await {
                    Ok(rate) => tracing::info!(rate, "price rate refreshed"),
                    Err(error) => {
                        tracing::warn!(?error, cached = self.current_rate(), "price refresh failed, keeping cached rate")
                    }
                }
            }
        })
    }
}

impl PriceQuote for CachedPriceService {
    fn current_rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_simple_price_body() {
        let body: SimplePriceResponse =
            serde_json::from_str(r#"{"solana": {"usd": 171.25}}"#).unwrap();
        assert_eq!(body.first_rate(), Some(171.25));
    }

    #[test]
    fn zero_or_missing_rates_are_unusable() {
        let body: SimplePriceResponse = serde_json::from_str(r#"{"solana": {"usd": 0}}"#).unwrap();
        assert_eq!(body.first_rate(), None);
        let empty: SimplePriceResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.first_rate(), None);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_fallback() {
        let service = CachedPriceService::new("http://127.0.0.1:9/unreachable", 150.0);
        assert!(service.refresh().await.is_err());
        assert_eq!(service.current_rate(), 150.0);
    }

    #[test]
    fn fixed_rate_is_constant() {
        assert_eq!(FixedRate(2.5).current_rate(), 2.5);
    }
}
