//! Generative-language providers.
//!
//! The session only needs "prompt in, text out"; `LanguageModel` is that seam so
//! another API can be plugged in without touching the session machinery.

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::ApiKey;

pub use gemini::GeminiClient;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Generate a reply for a single flattened prompt.
    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String>;
}
