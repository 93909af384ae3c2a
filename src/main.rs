use serpent_arena::config::ServerConfig;
use serpent_arena::pricing::{CachedPriceService, PriceQuote};
use serpent_arena::room_runtime;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    let prices = Arc::new(CachedPriceService::new(
        config.price_api_url.clone(),
        config.fallback_usd_rate,
    ));
    Arc::clone(&prices).spawn_refresh_loop(config.price_refresh);

    let quote: Arc<dyn PriceQuote> = prices;
    room_runtime::run(config, quote).await
}
