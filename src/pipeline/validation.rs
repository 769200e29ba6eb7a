//! Validation chain: ordered, short-circuiting checks on a generated draft.
//!
//! 1. confidence: generator confidence and quality score at or above minimums
//! 2. length: word count within [min_words, max_words]
//! 3. safety: delegated to the `SafetyChecker`, whose verdict is final
//!
//! After the first check that does not pass, the remaining checks are
//! recorded as skipped and never executed.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ValidationPolicy;
use crate::pipeline::traits::SafetyChecker;
use crate::pipeline::types::{
    CheckName, CheckResult, CheckStatus, GenerationCandidate, ValidationOutcome,
};

/// Runs the post-generation checks for one candidate.
pub struct ValidationChain<'a> {
    policy: &'a ValidationPolicy,
    safety: &'a dyn SafetyChecker,
}

impl<'a> ValidationChain<'a> {
    pub fn new(policy: &'a ValidationPolicy, safety: &'a dyn SafetyChecker) -> Self {
        Self { policy, safety }
    }

    /// Validate a candidate. The safety call must finish before `deadline`.
    pub async fn validate(
        &self,
        candidate: &GenerationCandidate,
        deadline: Instant,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for check in CheckName::ORDER {
            let halted = outcome
                .checks
                .last()
                .is_some_and(|last| last.status != CheckStatus::Passed);

            let result = if halted {
                CheckResult {
                    check,
                    status: CheckStatus::Skipped,
                    detail: "skipped after earlier check did not pass".into(),
                }
            } else {
                match check {
                    CheckName::Confidence => self.check_confidence(candidate),
                    CheckName::Length => self.check_length(candidate),
                    CheckName::Safety => self.check_safety(candidate, deadline).await,
                }
            };

            debug!(
                check = %result.check,
                status = ?result.status,
                detail = %result.detail,
                "Validation check"
            );
            outcome.checks.push(result);
        }

        outcome
    }

    fn check_confidence(&self, candidate: &GenerationCandidate) -> CheckResult {
        let policy = self.policy;
        let (status, detail) = if candidate.confidence < policy.min_confidence {
            (
                CheckStatus::Failed,
                format!(
                    "generator confidence {} below minimum {}",
                    candidate.confidence, policy.min_confidence
                ),
            )
        } else if candidate.quality_score < policy.min_quality {
            (
                CheckStatus::Failed,
                format!(
                    "quality score {} below minimum {}",
                    candidate.quality_score, policy.min_quality
                ),
            )
        } else {
            (
                CheckStatus::Passed,
                format!(
                    "confidence {} and quality {} meet minimums",
                    candidate.confidence, candidate.quality_score
                ),
            )
        };

        CheckResult {
            check: CheckName::Confidence,
            status,
            detail,
        }
    }

    fn check_length(&self, candidate: &GenerationCandidate) -> CheckResult {
        let words = candidate.word_count;
        let (min, max) = (self.policy.min_words, self.policy.max_words);
        let (status, detail) = if words < min {
            (
                CheckStatus::Failed,
                format!("draft too short ({words} words, minimum {min})"),
            )
        } else if words > max {
            (
                CheckStatus::Failed,
                format!("draft too long ({words} words, maximum {max})"),
            )
        } else {
            (CheckStatus::Passed, format!("{words} words within [{min}, {max}]"))
        };

        CheckResult {
            check: CheckName::Length,
            status,
            detail,
        }
    }

    async fn check_safety(
        &self,
        candidate: &GenerationCandidate,
        deadline: Instant,
    ) -> CheckResult {
        let verdict =
            tokio::time::timeout_at(deadline, self.safety.is_safe(&candidate.draft)).await;

        let (status, detail) = match verdict {
            Ok(Ok(true)) => (CheckStatus::Passed, "safety policy passed".to_string()),
            Ok(Ok(false)) => (
                CheckStatus::Failed,
                format!("rejected by safety policy ({})", self.safety.model_tag()),
            ),
            Ok(Err(e)) => {
                warn!(error = %e, "Safety check errored");
                (CheckStatus::Errored, format!("safety check error: {e}"))
            }
            Err(_) => {
                warn!(checker = self.safety.model_tag(), "Safety check timed out");
                (CheckStatus::Errored, "safety check timed out".to_string())
            }
        };

        CheckResult {
            check: CheckName::Safety,
            status,
            detail,
        }
    }
}
