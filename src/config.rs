use crate::{
    core::ForgeError,
    engine::DEFAULT_CHUNK_SIZE,
};

/// Runtime configuration, read from the environment (with `.env` support).
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub anki_connect_url: String,
    pub default_deck: String,
    pub bind_addr: String,
    pub chunk_size: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, ForgeError> {
        dotenvy::dotenv().ok();

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ForgeError::MissingConfig("OPENAI_API_KEY is not set".to_string()))?;

        let chunk_size = std::env::var("CHUNK_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        Ok(Self {
            openai_api_key,
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok().filter(|v| !v.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL").ok().filter(|v| !v.is_empty()),
            anki_connect_url: env_or("ANKI_CONNECT_URL", "http://localhost:8765"),
            default_deck: env_or("DEFAULT_DECK_NAME", "test"),
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:2341"),
            chunk_size,
        })
    }
}
