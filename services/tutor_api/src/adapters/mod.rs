pub mod credential_file;
pub mod gemini;
pub mod notifications;
pub mod openai;

pub use credential_file::FileCredentialStore;
pub use gemini::{GeminiAdapter, GeminiClientFactory};
pub use notifications::NotificationQueue;
pub use openai::{OpenAiAdapter, OpenAiClientFactory};

use crate::config::{AiProvider, Config};
use chain_tutor_core::ports::ClientFactory;
use std::sync::Arc;

/// Picks the client factory for the configured provider.
pub fn client_factory(config: &Config) -> Arc<dyn ClientFactory> {
    match config.provider {
        AiProvider::Gemini => Arc::new(GeminiClientFactory::new(config.gemini_base_url.clone())),
        AiProvider::OpenAi => Arc::new(OpenAiClientFactory),
    }
}
