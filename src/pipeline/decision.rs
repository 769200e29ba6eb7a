//! Decision engine: the transition table from pipeline state to action.
//!
//! Rows are evaluated top-down, first match wins:
//!
//! | Condition                                         | Action       | Reason                 |
//! |---------------------------------------------------|--------------|------------------------|
//! | sentiment is aggressive                           | ESCALATE     | aggressive-sentiment   |
//! | intent is spam                                    | IGNORE       | spam-intent            |
//! | gate not admitted                                 | ESCALATE     | low-confidence         |
//! | generation failed (or never ran after admission)  | ESCALATE     | pipeline-stage-failure |
//! | a validation check errored                        | ESCALATE     | pipeline-stage-failure |
//! | validation invalid                                | ESCALATE     | validation-failed      |
//! | preference is always_review                       | DRAFT_REVIEW | policy-review          |
//! | preference is auto_send, overall ≥ threshold      | AUTO_SEND    | auto-send-eligible     |
//! | otherwise                                         | DRAFT_REVIEW | default-review         |
//!
//! AUTO_SEND is reachable through exactly one row.

use tracing::debug;

use crate::config::{DecisionPolicy, UserPreference};
use crate::pipeline::gate::GateResult;
use crate::pipeline::types::{
    ClassificationResult, Confidence, Decision, DecisionReason, FailureKind, GenerationCandidate,
    Intent, Sentiment, SignalKind, StageFailure, Trigger, ValidationOutcome,
};

/// What happened to draft generation in this run.
#[derive(Debug, Clone, Copy)]
pub enum GenerationStatus<'a> {
    /// Generation was never started.
    NotAttempted,
    /// A collaborator failed after the gate admitted the email.
    Failed(&'a StageFailure),
    /// A draft was produced and run through the validation chain.
    Produced {
        candidate: &'a GenerationCandidate,
        validation: &'a ValidationOutcome,
    },
}

/// Map one run's state to its terminal decision.
pub fn decide(
    classification: &ClassificationResult,
    gate: &GateResult,
    generation: GenerationStatus<'_>,
    policy: &DecisionPolicy,
) -> Decision {
    let overall = overall_confidence(classification, generation);

    let decision = if classification.sentiment.label == Sentiment::Aggressive {
        Decision::new(
            DecisionReason::AggressiveSentiment,
            overall,
            [Trigger::Signal(SignalKind::Sentiment)],
        )
    } else if classification.intent.label == Intent::Spam {
        Decision::new(
            DecisionReason::SpamIntent,
            overall,
            [Trigger::Signal(SignalKind::Intent)],
        )
    } else if !gate.admitted {
        let weakest = gate
            .failing_signal
            .unwrap_or_else(|| classification.weakest_signal().0);
        Decision::new(
            DecisionReason::LowConfidence,
            overall,
            [Trigger::Signal(weakest)],
        )
    } else {
        match generation {
            GenerationStatus::NotAttempted => Decision::new(
                DecisionReason::PipelineStageFailure,
                overall,
                [Trigger::Failure(FailureKind::GenerationFailed)],
            ),
            GenerationStatus::Failed(failure) => Decision::new(
                DecisionReason::PipelineStageFailure,
                overall,
                [Trigger::Failure(failure.kind)],
            ),
            GenerationStatus::Produced { validation, .. } => {
                review_or_send(validation, overall, policy)
            }
        }
    };

    debug!(
        action = %decision.action,
        reason = %decision.reason,
        overall_confidence = %decision.overall_confidence,
        "Decision table evaluated"
    );

    decision
}

/// The decision for a run that failed before the gate could be evaluated.
pub fn fail_safe(failure: &StageFailure) -> Decision {
    Decision::new(
        DecisionReason::PipelineStageFailure,
        Confidence::ZERO,
        [Trigger::Failure(failure.kind)],
    )
}

fn review_or_send(
    validation: &ValidationOutcome,
    overall: Confidence,
    policy: &DecisionPolicy,
) -> Decision {
    if let Some(errored) = validation.errored() {
        return Decision::new(
            DecisionReason::PipelineStageFailure,
            overall,
            [
                Trigger::Failure(FailureKind::ValidationCheckError),
                Trigger::Check(errored.check),
            ],
        );
    }

    if !validation.is_valid() {
        let failed = validation.first_failure().map(|check| Trigger::Check(check.check));
        return Decision::new(DecisionReason::ValidationFailed, overall, failed);
    }

    match policy.preference {
        UserPreference::AlwaysReview => Decision::new(DecisionReason::PolicyReview, overall, []),
        UserPreference::AutoSend if overall >= policy.auto_send_threshold => {
            Decision::new(DecisionReason::AutoSendEligible, overall, [])
        }
        UserPreference::AutoSend => Decision::new(
            DecisionReason::DefaultReview,
            overall,
            [Trigger::BelowAutoSendThreshold],
        ),
    }
}

/// Weakest link across the classification and, when present, the draft.
fn overall_confidence(
    classification: &ClassificationResult,
    generation: GenerationStatus<'_>,
) -> Confidence {
    let signals = classification.min_confidence();
    match generation {
        GenerationStatus::Produced { candidate, .. } => signals.min(candidate.confidence),
        _ => signals,
    }
}
