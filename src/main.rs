use std::sync::Arc;

use ankiforge::{
    anki::{
        AnkiClient,
        CardStore,
    },
    config::Config,
    core::ForgeError,
    engine::ReconcileEngine,
    generator::OpenAiGenerator,
    server::{
        self,
        AppState,
    },
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Red flag selects cards for reconciliation; the review marker (orange) is
/// set separately by the engine.
const RECONCILE_FLAG: u8 = 1;

#[tokio::main]
async fn main() -> Result<(), ForgeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    let store = AnkiClient::new(&config.anki_connect_url)?;
    if !store.health_check().await {
        warn!("Anki is not reachable at {}; store operations will fail until it is launched", config.anki_connect_url);
    }

    let mut generator = OpenAiGenerator::new(&config.openai_api_key)?;
    if let Some(base_url) = &config.openai_base_url {
        generator = generator.with_base_url(base_url);
    }
    if let Some(model) = &config.openai_model {
        generator = generator.with_model(model);
    }

    let engine = ReconcileEngine::new(store, generator).with_chunk_size(config.chunk_size);

    let state = AppState {
        engine: Arc::new(engine),
        default_deck: config.default_deck,
        reconcile_flag: RECONCILE_FLAG,
    };

    server::serve(state, &config.bind_addr).await
}
