//! Keyword sentiment analyzer with a hostility screen.
//!
//! Aggressive signals are checked first: hostile keywords, shouting (more
//! than 30% capitals in the body), then a run of exclamation marks.

use async_trait::async_trait;
use tracing::debug;

use super::{Keywords, normalize};
use crate::error::ClassifierError;
use crate::pipeline::traits::SignalClassifier;
use crate::pipeline::types::{Confidence, Email, LabeledScore, Sentiment};

const MODEL_TAG: &str = "rules-sentiment/1";

/// Share of uppercase characters in the body above which it reads as shouting.
const SHOUTING_RATIO: f32 = 0.3;

/// Exclamation marks tolerated before the tone counts as aggressive.
const MAX_EXCLAMATIONS: usize = 3;

const POSITIVE: &[&str] = &[
    "thank",
    "thanks",
    "appreciate",
    "grateful",
    "great",
    "excellent",
    "wonderful",
    "happy",
    "pleased",
    "love",
    "perfect",
    "amazing",
    "fantastic",
    "good",
];

const NEGATIVE: &[&str] = &[
    "unfortunately",
    "problem",
    "issue",
    "concern",
    "disappointed",
    "frustrated",
    "unhappy",
    "dissatisfied",
    "bad",
    "poor",
    "wrong",
    "mistake",
    "error",
    "fail",
];

const AGGRESSIVE: &[&str] = &[
    "demand",
    "immediately",
    "unacceptable",
    "terrible",
    "worst",
    "hate",
    "angry",
    "furious",
    "ridiculous",
    "incompetent",
    "pathetic",
    "disgrace",
    "lawsuit",
    "lawyer",
    "sue",
];

pub struct RuleSentimentAnalyzer {
    positive: Keywords,
    negative: Keywords,
    aggressive: Keywords,
}

impl RuleSentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            positive: Keywords::new(POSITIVE),
            negative: Keywords::new(NEGATIVE),
            aggressive: Keywords::new(AGGRESSIVE),
        }
    }

    pub fn evaluate(&self, text: &str, email: &Email) -> LabeledScore<Sentiment> {
        let normalized = normalize(text);

        let hostile = self.aggressive.matches(&normalized);
        if !hostile.is_empty() {
            return scored(
                Sentiment::Aggressive,
                0.90,
                format!("aggressive language: {}", hostile.join(", ")),
            );
        }

        let ratio = capitals_ratio(&email.body);
        if ratio > SHOUTING_RATIO {
            return scored(
                Sentiment::Aggressive,
                0.85,
                format!("excessive capitalization ({:.0}%)", ratio * 100.0),
            );
        }

        let exclamations = text.matches('!').count();
        if exclamations > MAX_EXCLAMATIONS {
            return scored(
                Sentiment::Aggressive,
                0.75,
                format!("excessive exclamation marks ({exclamations})"),
            );
        }

        let positive = self.positive.matches(&normalized).len();
        let negative = self.negative.matches(&normalized).len();

        if positive > negative {
            scored(
                Sentiment::Positive,
                (0.70 + 0.05 * positive as f32).min(0.95),
                format!("{positive} positive keywords"),
            )
        } else if negative > positive {
            scored(
                Sentiment::Negative,
                (0.70 + 0.05 * negative as f32).min(0.90),
                format!("{negative} negative keywords"),
            )
        } else {
            scored(
                Sentiment::Neutral,
                0.75,
                "balanced or no sentiment indicators".to_string(),
            )
        }
    }
}

impl Default for RuleSentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalClassifier<Sentiment> for RuleSentimentAnalyzer {
    fn model_tag(&self) -> &str {
        MODEL_TAG
    }

    async fn classify(
        &self,
        text: &str,
        metadata: &Email,
    ) -> Result<LabeledScore<Sentiment>, ClassifierError> {
        let score = self.evaluate(text, metadata);
        debug!(
            id = %metadata.id,
            sentiment = %score.label,
            confidence = %score.confidence,
            "Sentiment analyzed"
        );
        Ok(score)
    }
}

fn capitals_ratio(body: &str) -> f32 {
    let total = body.chars().count().max(1);
    let upper = body.chars().filter(|c| c.is_uppercase()).count();
    upper as f32 / total as f32
}

fn scored(sentiment: Sentiment, confidence: f32, reasoning: String) -> LabeledScore<Sentiment> {
    LabeledScore::new(sentiment, Confidence::saturating(confidence)).with_reasoning(reasoning)
}
