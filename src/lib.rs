pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod llm;
pub mod prompts;
pub mod telemetry;
pub mod validator;

use std::sync::Arc;

use config::Config;
use error::Result;
use llm::CompletionClient;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: CompletionClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let llm = CompletionClient::new(&config.ollama_base_url)?;
        Ok(Self {
            config: Arc::new(config),
            llm,
        })
    }
}
