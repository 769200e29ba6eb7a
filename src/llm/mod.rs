//! LLM integration for draft generation.
//!
//! `LlmProvider` is the capability the LLM and RAG strategies call; the
//! Anthropic Messages API is the one concrete backend.

pub mod anthropic;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Default model when `TRIAGE_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = AnthropicProvider::new(config.api_key.clone(), &config.model)?;
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(provider))
}
