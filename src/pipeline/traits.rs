//! Capability traits for the pipeline's external collaborators.
//!
//! Adapters are pure I/O or inference: they never decide what happens to
//! an email. Gating, strategy, validation policy, and the final action live
//! in the pipeline.

use async_trait::async_trait;

use crate::error::{ClassifierError, GenerationError, KnowledgeBaseError, SafetyError, SinkError};
use crate::pipeline::types::{
    Email, GenerationCandidate, GenerationRequest, LabeledScore, ProcessedEmail, Snippet,
};

/// A signal provider: intent classifier, urgency detector, or sentiment analyzer.
#[async_trait]
pub trait SignalClassifier<L: Send + 'static>: Send + Sync {
    /// Model/version tag recorded in the audit trail.
    fn model_tag(&self) -> &str;

    /// Score cleaned text. `metadata` is the email the text came from.
    async fn classify(
        &self,
        text: &str,
        metadata: &Email,
    ) -> Result<LabeledScore<L>, ClassifierError>;
}

/// Executes a chosen generation strategy. One call per run, no retries.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_tag(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationCandidate, GenerationError>;
}

/// Context lookup for the RAG strategy. An empty result is valid.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Snippet>, KnowledgeBaseError>;
}

/// Authoritative content policy check (profanity, PII, tone).
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    fn model_tag(&self) -> &str;

    async fn is_safe(&self, text: &str) -> Result<bool, SafetyError>;
}

/// Receives finished decisions for persistence or notification.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn emit(&self, processed: &ProcessedEmail) -> Result<(), SinkError>;
}
