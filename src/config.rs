use crate::game::constants::{
    DEFAULT_MAX_PLAYERS_PER_ROOM, DEFAULT_OUTBOUND_QUEUE_CAPACITY, DEFAULT_TICK_RATE,
};
use anyhow::bail;
use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PRICE_API_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";
pub const DEFAULT_PRICE_REFRESH_SECS: u64 = 60;
pub const DEFAULT_FALLBACK_USD_RATE: f64 = 150.0;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub tick_rate: u32,
    pub max_players_per_room: usize,
    pub price_api_url: String,
    pub price_refresh: Duration,
    pub fallback_usd_rate: f64,
    pub spectator_username: Option<String>,
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            max_players_per_room: DEFAULT_MAX_PLAYERS_PER_ROOM,
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            price_refresh: Duration::from_secs(DEFAULT_PRICE_REFRESH_SECS),
            fallback_usd_rate: DEFAULT_FALLBACK_USD_RATE,
            spectator_username: None,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn trimmed(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            tick_rate: parsed("TICK_RATE").unwrap_or(defaults.tick_rate),
            max_players_per_room: parsed("MAX_PLAYERS_PER_ROOM")
                .unwrap_or(defaults.max_players_per_room),
            price_api_url: trimmed("PRICE_API_URL").unwrap_or(defaults.price_api_url),
            price_refresh: parsed::<u64>("PRICE_REFRESH_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.price_refresh),
            fallback_usd_rate: parsed("FALLBACK_USD_RATE").unwrap_or(defaults.fallback_usd_rate),
            spectator_username: trimmed("SPECTATOR_USERNAME"),
            outbound_queue_capacity: parsed("OUTBOUND_QUEUE_CAPACITY")
                .unwrap_or(defaults.outbound_queue_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_rate == 0 {
            bail!("TICK_RATE must be greater than zero");
        }
        if self.max_players_per_room == 0 {
            bail!("MAX_PLAYERS_PER_ROOM must be greater than zero");
        }
        if !self.fallback_usd_rate.is_finite() || self.fallback_usd_rate <= 0.0 {
            bail!("FALLBACK_USD_RATE must be a positive number");
        }
        if self.outbound_queue_capacity == 0 {
            bail!("OUTBOUND_QUEUE_CAPACITY must be greater than zero");
        }
        if self.price_refresh.is_zero() {
            bail!("PRICE_REFRESH_SECS must be greater than zero");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_micros(16_666));
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_fallback_rate_is_rejected() {
        let config = ServerConfig {
            fallback_usd_rate: f64::NAN,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
