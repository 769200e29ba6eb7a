//! Error types for the triage pipeline.
//!
//! Collaborator errors (classifier, generator, safety, knowledge base) never
//! reach the caller of `EmailProcessor::process`: the orchestrator converts
//! them into a fail-safe escalation. Only malformed input and configuration
//! problems surface as hard failures.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signal provider errors (intent, urgency, sentiment).
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model {model} unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },
}

/// Draft generation errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation failed ({strategy}): {reason}")]
    GenerationFailed { strategy: String, reason: String },

    #[error("Generator produced an empty draft ({strategy})")]
    EmptyDraft { strategy: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Safety-check errors. A check that *runs* and rejects text is not an error.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("Safety checker {checker} failed: {reason}")]
    CheckFailed { checker: String, reason: String },
}

/// Knowledge-base lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Knowledge base lookup failed: {reason}")]
    LookupFailed { reason: String },

    #[error("Failed to load knowledge base: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decision sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the pipeline itself.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed email: a precondition violation, not a runtime contingency.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
