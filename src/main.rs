use colosseum::config::ColosseumConfig;
use colosseum::producer::GeminiProducer;
use colosseum::server::{self, AppState};
use colosseum::store::SupabaseStore;

use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = ColosseumConfig::load().context("Failed to load configuration")?;

    println!("{}", "⚔️  Poker AI Colosseum".bold());
    println!(
        "   {} Brain: {} (fallback: {})",
        "🧠".cyan(),
        config.primary_model.bold(),
        config.fallback_model
    );
    println!(
        "   {} Posting dice: {}%, cast mode: {:?}",
        "🎲".cyan(),
        config.post_probability,
        config.persona_mode
    );

    let store = Arc::new(SupabaseStore::from_env().context("Failed to init arena store")?);
    let producer =
        Arc::new(GeminiProducer::new(config.clone()).context("Failed to init debate producer")?);
    println!("{} Arena store and debate producer online", "🏟️".green());

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        store,
        producer,
    };

    server::start_server(state, port).await
}
