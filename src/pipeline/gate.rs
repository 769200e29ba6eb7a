//! Confidence gate: decides whether a reply may be generated at all.
//!
//! Admission requires the weakest signal to reach the intent's threshold
//! (inclusive) and no hard veto:
//! - aggressive sentiment → never generate
//! - spam intent → never generate
//!
//! Pure function of the classification and the gate configuration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GateConfig;
use crate::pipeline::types::{ClassificationResult, Confidence, Intent, Sentiment, SignalKind};

/// Hard vetoes that block generation regardless of confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Veto {
    AggressiveSentiment,
    SpamIntent,
}

/// Outcome of the confidence gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub admitted: bool,
    /// Weakest-link confidence across the three signals.
    pub min_confidence: Confidence,
    /// Threshold that applied to the classified intent.
    pub threshold: Confidence,
    /// Signal responsible for a rejection (weakest or vetoing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_signal: Option<SignalKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto: Option<Veto>,
}

/// Evaluate the gate for one classification.
pub fn admit(classification: &ClassificationResult, config: &GateConfig) -> GateResult {
    let (weakest, min_confidence) = classification.weakest_signal();
    let threshold = config.threshold_for(classification.intent.label);

    let veto = if classification.sentiment.label == Sentiment::Aggressive {
        Some(Veto::AggressiveSentiment)
    } else if classification.intent.label == Intent::Spam {
        Some(Veto::SpamIntent)
    } else {
        None
    };

    let confident = min_confidence >= threshold;

    let failing_signal = match veto {
        Some(Veto::AggressiveSentiment) => Some(SignalKind::Sentiment),
        Some(Veto::SpamIntent) => Some(SignalKind::Intent),
        None if !confident => Some(weakest),
        None => None,
    };

    let admitted = confident && veto.is_none();

    debug!(
        intent = %classification.intent.label,
        min_confidence = %min_confidence,
        threshold = %threshold,
        admitted,
        veto = ?veto,
        "Confidence gate evaluated"
    );

    GateResult {
        admitted,
        min_confidence,
        threshold,
        failing_signal,
        veto,
    }
}
