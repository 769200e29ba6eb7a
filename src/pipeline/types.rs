//! Shared types for the triage pipeline.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::pipeline::audit::AuditRecord;
use crate::pipeline::gate::GateResult;

// ── Inbound email ───────────────────────────────────────────────────

/// An already-cleaned inbound email.
///
/// Owned by the caller and borrowed by the pipeline for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Unique ID (message-id or generated).
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Recipient address.
    #[serde(default)]
    pub recipient: String,
    /// Subject line (may be empty).
    #[serde(default)]
    pub subject: String,
    /// Cleaned body text (quotes and signatures already stripped).
    pub body: String,
    /// Conversation thread identifier.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// When the email was received.
    pub received_at: DateTime<Utc>,
    /// Domain part of the sender address. Derived from `sender` when empty.
    #[serde(default)]
    pub sender_domain: String,
}

impl Email {
    /// Build an email, deriving the sender domain from the address.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let sender = sender.into();
        let sender_domain = domain_of(&sender);
        Self {
            id: id.into(),
            sender,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            thread_id: None,
            received_at,
            sender_domain,
        }
    }

    /// Attach a thread identifier.
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Check required fields. A failure here is a caller bug, not a
    /// runtime contingency, so it is the one error returned as-is.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("email id is empty".into()));
        }
        if self.sender.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "email {} has no sender",
                self.id
            )));
        }
        if !self.sender.contains('@') {
            return Err(PipelineError::InvalidInput(format!(
                "email {} has malformed sender '{}'",
                self.id, self.sender
            )));
        }
        if self.body.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "email {} has an empty body",
                self.id
            )));
        }
        Ok(())
    }

    /// Sender domain, falling back to the address when the field was omitted.
    pub fn domain(&self) -> String {
        if self.sender_domain.is_empty() {
            domain_of(&self.sender)
        } else {
            self.sender_domain.to_lowercase()
        }
    }

    /// Text handed to the signal providers: subject, blank line, body.
    pub fn classification_text(&self) -> String {
        if self.subject.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.subject, self.body)
        }
    }
}

fn domain_of(address: &str) -> String {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').to_lowercase())
        .unwrap_or_default()
}

// ── Confidence ──────────────────────────────────────────────────────

/// A confidence value, guaranteed finite and within [0, 1].
///
/// Every threshold comparison and the weakest-link rule go through this
/// type, so an out-of-range score can never reach the gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

/// Rejected confidence value.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("confidence {0} is outside [0, 1]")]
pub struct ConfidenceError(pub f32);

impl Confidence {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    /// Validate a raw score.
    pub fn new(value: f32) -> Result<Self, ConfidenceError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            // normalise -0.0 so Eq and Ord agree
            Ok(Self(if value == 0.0 { 0.0 } else { value }))
        } else {
            Err(ConfidenceError(value))
        }
    }

    /// Clamp a raw score into range. NaN becomes zero.
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self::ZERO
        } else {
            Self::new(value.clamp(0.0, 1.0)).unwrap_or(Self::ZERO)
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Weakest-link aggregation: the minimum of all scores.
    pub fn weakest(scores: impl IntoIterator<Item = Confidence>) -> Option<Confidence> {
        scores.into_iter().min()
    }
}

impl Eq for Confidence {}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Confidence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f32> for Confidence {
    type Error = ConfidenceError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ── Signal labels ───────────────────────────────────────────────────

/// Which signal provider produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Intent,
    Urgency,
    Sentiment,
}

impl SignalKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Urgency => "urgency",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Purpose category of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Academic,
    Internship,
    Meeting,
    Support,
    Complaint,
    Spam,
    General,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::Academic,
        Self::Internship,
        Self::Meeting,
        Self::Support,
        Self::Complaint,
        Self::Spam,
        Self::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Internship => "internship",
            Self::Meeting => "meeting",
            Self::Support => "support",
            Self::Complaint => "complaint",
            Self::Spam => "spam",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown intent: {s}"))
    }
}

/// How soon an email needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Critical or high.
    pub fn is_pressing(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Emotional register of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Aggressive,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Classification ──────────────────────────────────────────────────

/// One signal's output: a label with its confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledScore<L> {
    pub label: L,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl<L> LabeledScore<L> {
    pub fn new(label: L, confidence: Confidence) -> Self {
        Self {
            label,
            confidence,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// All three signals for one email. Exactly one label per signal kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: LabeledScore<Intent>,
    pub urgency: LabeledScore<Urgency>,
    pub sentiment: LabeledScore<Sentiment>,
}

impl ClassificationResult {
    pub fn new(
        intent: LabeledScore<Intent>,
        urgency: LabeledScore<Urgency>,
        sentiment: LabeledScore<Sentiment>,
    ) -> Self {
        Self {
            intent,
            urgency,
            sentiment,
        }
    }

    /// Weakest-link confidence across the three signals.
    pub fn min_confidence(&self) -> Confidence {
        self.weakest_signal().1
    }

    /// The signal carrying the minimum confidence. Ties resolve in
    /// intent, urgency, sentiment order.
    pub fn weakest_signal(&self) -> (SignalKind, Confidence) {
        [
            (SignalKind::Intent, self.intent.confidence),
            (SignalKind::Urgency, self.urgency.confidence),
            (SignalKind::Sentiment, self.sentiment.confidence),
        ]
        .into_iter()
        .fold((SignalKind::Intent, Confidence::ONE), |acc, next| {
            if next.1 < acc.1 { next } else { acc }
        })
    }
}

// ── Generation ──────────────────────────────────────────────────────

/// Draft generation strategy (and the method recorded on a candidate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Template,
    Rag,
    Llm,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Rag => "rag",
            Self::Llm => "llm",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A retrieved knowledge-base passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub content: String,
    /// Relevance score, higher is better.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Everything a generator needs for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub strategy: Strategy,
    pub email: &'a Email,
    pub classification: &'a ClassificationResult,
    /// Retrieved context. Only populated for the RAG strategy.
    pub context: Option<&'a [Snippet]>,
}

/// Token accounting for LLM-backed candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: Decimal,
}

/// One generated draft reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationCandidate {
    pub draft: String,
    pub method: Strategy,
    pub confidence: Confidence,
    pub quality_score: Confidence,
    pub word_count: usize,
    /// Model or template set that produced the draft.
    pub model_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

// ── Validation ──────────────────────────────────────────────────────

/// Post-generation checks, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    Confidence,
    Length,
    Safety,
}

impl CheckName {
    pub const ORDER: [CheckName; 3] = [Self::Confidence, Self::Length, Self::Safety];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Confidence => "confidence",
            Self::Length => "length",
            Self::Safety => "safety",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    /// The check ran and rejected the draft.
    Failed,
    /// Not executed because an earlier check did not pass.
    Skipped,
    /// The check itself could not complete (error or timeout).
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckName,
    pub status: CheckStatus,
    pub detail: String,
}

/// Ordered results of the validation chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub checks: Vec<CheckResult>,
}

impl ValidationOutcome {
    /// Valid only when every check ran and passed.
    pub fn is_valid(&self) -> bool {
        !self.checks.is_empty()
            && self
                .checks
                .iter()
                .all(|c| c.status == CheckStatus::Passed)
    }

    /// First check that did not pass (failed or errored).
    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.checks
            .iter()
            .find(|c| matches!(c.status, CheckStatus::Failed | CheckStatus::Errored))
    }

    /// The check that errored, if any.
    pub fn errored(&self) -> Option<&CheckResult> {
        self.checks
            .iter()
            .find(|c| c.status == CheckStatus::Errored)
    }

    pub fn status_of(&self, check: CheckName) -> Option<CheckStatus> {
        self.checks
            .iter()
            .find(|c| c.check == check)
            .map(|c| c.status)
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Terminal action for one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AutoSend,
    DraftReview,
    Escalate,
    Ignore,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoSend => "AUTO_SEND",
            Self::DraftReview => "DRAFT_REVIEW",
            Self::Escalate => "ESCALATE",
            Self::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a decision was reached. Each reason maps to exactly one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    AggressiveSentiment,
    SpamIntent,
    LowConfidence,
    PipelineStageFailure,
    ValidationFailed,
    PolicyReview,
    AutoSendEligible,
    DefaultReview,
}

impl DecisionReason {
    pub fn action(&self) -> Action {
        match self {
            Self::AggressiveSentiment
            | Self::LowConfidence
            | Self::PipelineStageFailure
            | Self::ValidationFailed => Action::Escalate,
            Self::SpamIntent => Action::Ignore,
            Self::PolicyReview | Self::DefaultReview => Action::DraftReview,
            Self::AutoSendEligible => Action::AutoSend,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::AggressiveSentiment => "aggressive-sentiment",
            Self::SpamIntent => "spam-intent",
            Self::LowConfidence => "low-confidence",
            Self::PipelineStageFailure => "pipeline-stage-failure",
            Self::ValidationFailed => "validation-failed",
            Self::PolicyReview => "policy-review",
            Self::AutoSendEligible => "auto-send-eligible",
            Self::DefaultReview => "default-review",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Named cause recorded alongside a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// The decision reason itself.
    Reason(DecisionReason),
    /// Signal holding the weakest (or vetoing) score.
    Signal(SignalKind),
    /// Validation check that did not pass.
    Check(CheckName),
    /// Collaborator failure that forced escalation.
    Failure(FailureKind),
    /// Auto-send was requested but the confidence fell short.
    BelowAutoSendThreshold,
}

/// Terminal artifact of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: DecisionReason,
    pub overall_confidence: Confidence,
    pub triggers: BTreeSet<Trigger>,
}

impl Decision {
    /// Build a decision whose action follows from its reason.
    pub fn new(
        reason: DecisionReason,
        overall_confidence: Confidence,
        extra_triggers: impl IntoIterator<Item = Trigger>,
    ) -> Self {
        let mut triggers: BTreeSet<Trigger> = extra_triggers.into_iter().collect();
        triggers.insert(Trigger::Reason(reason));
        Self {
            action: reason.action(),
            reason,
            overall_confidence,
            triggers,
        }
    }

    pub fn has_trigger(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }
}

// ── Stages and failures ─────────────────────────────────────────────

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Gate,
    Retrieval,
    StrategySelection,
    Generation,
    Validation,
    Decision,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Gate => "gate",
            Self::Retrieval => "retrieval",
            Self::StrategySelection => "strategy_selection",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Decision => "decision",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Runtime contingencies that force the fail-safe escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// A classifier failed or timed out.
    SignalUnavailable,
    /// Generator error, timeout, or empty output.
    GenerationFailed,
    /// A validation check errored (distinct from rejecting the draft).
    ValidationCheckError,
    /// The run's overall budget was exceeded.
    PipelineTimeout,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SignalUnavailable => "signal-unavailable",
            Self::GenerationFailed => "generation-failed",
            Self::ValidationCheckError => "validation-check-error",
            Self::PipelineTimeout => "pipeline-timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A collaborator failure recorded against the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub detail: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.stage, self.detail)
    }
}

// ── Processed email ─────────────────────────────────────────────────

/// Result of running one email through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEmail {
    pub email_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<GenerationCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    pub decision: Decision,
    pub audit: AuditRecord,
}
