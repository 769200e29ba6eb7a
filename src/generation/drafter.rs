//! The default `Generator`: templates locally, LLM for `llm` and `rag`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::llm::LlmDrafter;
use super::quality::{post_process, quality_score, word_count};
use super::template::{TEMPLATE_CONFIDENCE, TEMPLATE_TAG, TemplateEngine};
use crate::config::{PipelineConfig, ValidationPolicy};
use crate::error::GenerationError;
use crate::llm::LlmProvider;
use crate::pipeline::traits::Generator;
use crate::pipeline::types::{Confidence, GenerationCandidate, GenerationRequest, Strategy};

pub struct Drafter {
    templates: TemplateEngine,
    llm: Option<LlmDrafter>,
    policy: ValidationPolicy,
    signature: String,
    tag: String,
}

impl Drafter {
    /// Template-only drafter. LLM and RAG requests fail until a provider
    /// is attached.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            templates: TemplateEngine::new(&config.signature_name),
            llm: None,
            policy: config.validation.clone(),
            signature: config.signature_name.clone(),
            tag: TEMPLATE_TAG.to_string(),
        }
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.tag = format!("{TEMPLATE_TAG}+{}", provider.model_name());
        self.llm = Some(LlmDrafter::new(provider, &self.signature));
        self
    }

    fn candidate(
        &self,
        draft: String,
        method: Strategy,
        confidence: Confidence,
        model_tag: String,
    ) -> Result<GenerationCandidate, GenerationError> {
        if draft.trim().is_empty() {
            return Err(GenerationError::EmptyDraft {
                strategy: method.label().to_string(),
            });
        }
        Ok(GenerationCandidate {
            quality_score: quality_score(&draft, &self.policy),
            word_count: word_count(&draft),
            draft,
            method,
            confidence,
            model_tag,
            usage: None,
        })
    }
}

#[async_trait]
impl Generator for Drafter {
    fn model_tag(&self) -> &str {
        &self.tag
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationCandidate, GenerationError> {
        let candidate = match request.strategy {
            Strategy::Template => {
                let raw = self.templates.render(request.email, request.classification);
                self.candidate(
                    post_process(&raw, &self.signature, false),
                    Strategy::Template,
                    Confidence::saturating(TEMPLATE_CONFIDENCE),
                    TEMPLATE_TAG.to_string(),
                )?
            }
            strategy @ (Strategy::Rag | Strategy::Llm) => {
                let llm = self
                    .llm
                    .as_ref()
                    .ok_or_else(|| GenerationError::GenerationFailed {
                        strategy: strategy.label().to_string(),
                        reason: "no LLM provider configured".to_string(),
                    })?;
                let out = llm.draft(request).await?;
                let mut candidate = self.candidate(
                    post_process(&out.draft, &self.signature, true),
                    strategy,
                    out.confidence,
                    llm.model_name().to_string(),
                )?;
                candidate.usage = Some(out.usage);
                candidate
            }
        };

        debug!(
            email_id = %request.email.id,
            method = %candidate.method,
            confidence = %candidate.confidence,
            quality = %candidate.quality_score,
            words = candidate.word_count,
            "Draft ready"
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::pipeline::types::{
        ClassificationResult, Email, Intent, LabeledScore, Sentiment, Urgency,
    };

    struct Echo(&'static str);

    #[async_trait]
    impl LlmProvider for Echo {
        fn model_name(&self) -> &str {
            "echo-model"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn classification(intent: Intent) -> ClassificationResult {
        ClassificationResult::new(
            LabeledScore::new(intent, Confidence::ONE),
            LabeledScore::new(Urgency::Medium, Confidence::ONE),
            LabeledScore::new(Sentiment::Neutral, Confidence::ONE),
        )
    }

    fn email() -> Email {
        Email::new(
            "e-1",
            "jane.doe@x.com",
            "me@x.com",
            "Project sync",
            "Can we meet next week to discuss the roadmap?",
            Utc::now(),
        )
    }

    fn request<'a>(
        strategy: Strategy,
        email: &'a Email,
        classification: &'a ClassificationResult,
    ) -> GenerationRequest<'a> {
        GenerationRequest {
            strategy,
            email,
            classification,
            context: None,
        }
    }

    #[tokio::test]
    async fn template_candidate_is_well_formed() {
        let drafter = Drafter::new(&PipelineConfig::default());
        let (e, c) = (email(), classification(Intent::Meeting));
        let candidate = drafter.generate(request(Strategy::Template, &e, &c)).await.unwrap();

        assert_eq!(candidate.method, Strategy::Template);
        assert_eq!(candidate.confidence.value(), TEMPLATE_CONFIDENCE);
        assert!(candidate.draft.starts_with("Hello Jane Doe,"));
        assert_eq!(candidate.quality_score, Confidence::ONE);
        assert!(candidate.usage.is_none());
        assert_eq!(candidate.model_tag, TEMPLATE_TAG);
    }

    #[tokio::test]
    async fn llm_without_provider_fails() {
        let drafter = Drafter::new(&PipelineConfig::default());
        let (e, c) = (email(), classification(Intent::General));
        let result = drafter.generate(request(Strategy::Llm, &e, &c)).await;
        assert!(matches!(
            result,
            Err(GenerationError::GenerationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn llm_draft_gets_signature_and_usage() {
        let drafter = Drafter::new(&PipelineConfig::default()).with_llm(Arc::new(Echo(
            r#"{"draft": "Hi Jane,\n\nNext Tuesday works for me", "confidence": 0.8}"#,
        )));
        assert_eq!(drafter.model_tag(), "templates/1+echo-model");

        let (e, c) = (email(), classification(Intent::General));
        let candidate = drafter.generate(request(Strategy::Llm, &e, &c)).await.unwrap();
        assert!(candidate.draft.ends_with("Best regards,\nMe"));
        assert!(candidate.draft.contains("works for me\n"));
        assert_eq!(candidate.model_tag, "echo-model");
        assert_eq!(candidate.usage.as_ref().unwrap().output_tokens, 5);
    }
}
