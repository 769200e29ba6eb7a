//! LLM-backed drafting for the `llm` and `rag` strategies.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::GenerationError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::pipeline::types::{Confidence, GenerationRequest, Snippet, TokenUsage};

/// Confidence used when the model omits one or answers in plain text.
const FALLBACK_CONFIDENCE: f32 = 0.65;

/// Body characters quoted into the prompt.
const MAX_BODY_CHARS: usize = 2000;

const TEMPERATURE: f32 = 0.4;
const MAX_TOKENS: u32 = 800;

/// A draft as returned by the model, before post-processing.
#[derive(Debug, Clone)]
pub struct LlmDraft {
    pub draft: String,
    pub confidence: Confidence,
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    #[serde(default)]
    draft: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct LlmDrafter {
    provider: Arc<dyn LlmProvider>,
    signature: String,
}

impl LlmDrafter {
    pub fn new(provider: Arc<dyn LlmProvider>, signature: impl Into<String>) -> Self {
        Self {
            provider,
            signature: signature.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub async fn draft(&self, request: GenerationRequest<'_>) -> Result<LlmDraft, GenerationError> {
        let messages = self.build_messages(request);
        let completion = CompletionRequest::new(messages)
            .with_temperature(TEMPERATURE)
            .with_max_tokens(MAX_TOKENS);

        let response = self.provider.complete(completion).await?;
        if response.finish_reason == FinishReason::Length {
            warn!(email_id = %request.email.id, "Draft hit the token limit");
        }

        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost: self.provider.cost_of(&response),
        };

        let (draft, confidence) = parse_draft_response(&response.content);
        if draft.trim().is_empty() {
            return Err(GenerationError::EmptyDraft {
                strategy: request.strategy.label().to_string(),
            });
        }

        info!(
            email_id = %request.email.id,
            strategy = %request.strategy,
            model = self.provider.model_name(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = %usage.cost,
            "LLM draft generated"
        );

        Ok(LlmDraft {
            draft,
            confidence,
            usage,
        })
    }

    fn build_messages(&self, request: GenerationRequest<'_>) -> Vec<ChatMessage> {
        let system_prompt = format!(
            "You write email replies on behalf of {name}. Write a complete reply that is \
             professional, clear and concise, and sign it as {name}.\n\n\
             Respond with a JSON object with:\n\
             - \"draft\": the full reply text, including greeting and sign-off\n\
             - \"confidence\": 0.0-1.0 how confident you are the reply is appropriate \
             to send without edits\n\n\
             If the provided context does not answer the sender's question, say you \
             will follow up rather than inventing details. ONLY output the JSON object.",
            name = self.signature
        );

        let email = request.email;
        let c = request.classification;
        let body: String = email.body.chars().take(MAX_BODY_CHARS).collect();

        let mut user_prompt = format!(
            "Intent: {intent}\nUrgency: {urgency}\nSentiment: {sentiment}\n\n\
             From: {sender}\nSubject: {subject}\n\n{body}\n",
            intent = c.intent.label,
            urgency = c.urgency.label,
            sentiment = c.sentiment.label,
            sender = email.sender,
            subject = email.subject,
        );
        if let Some(context) = request.context.filter(|ctx| !ctx.is_empty()) {
            user_prompt.push_str("\nRelevant context:\n");
            user_prompt.push_str(&format_context(context));
        }

        vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ]
    }
}

/// Numbered context list for the prompt.
fn format_context(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}\n", i + 1, s.content.trim()))
        .collect()
}

/// Draft text and confidence from a model reply. Plain-text replies are
/// taken as the draft itself at the fallback confidence.
fn parse_draft_response(raw: &str) -> (String, Confidence) {
    let json = extract_json_object(raw);
    match serde_json::from_str::<DraftResponse>(&json) {
        Ok(parsed) => (
            parsed.draft,
            Confidence::saturating(parsed.confidence.unwrap_or(FALLBACK_CONFIDENCE)),
        ),
        Err(_) => (
            raw.trim().to_string(),
            Confidence::saturating(FALLBACK_CONFIDENCE),
        ),
    }
}

/// The JSON object in a reply, unwrapping markdown fences if present.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = trimmed[start + 3..].trim_start_matches("json");
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
