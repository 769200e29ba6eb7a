//! End-to-end runs through the public pipeline API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use mail_triage::classifiers;
use mail_triage::config::UserPreference;
use mail_triage::error::{ClassifierError, GenerationError, KnowledgeBaseError, PipelineError};
use mail_triage::generation::Drafter;
use mail_triage::pipeline::audit::StageOutcome;
use mail_triage::pipeline::traits::{Generator, KnowledgeBase, SignalClassifier};
use mail_triage::pipeline::types::{
    Confidence, FailureKind, GenerationCandidate, GenerationRequest, Intent, LabeledScore,
    Sentiment, SignalKind, Snippet, Stage, Strategy, Trigger, Urgency,
};
use mail_triage::safety::PolicySafetyChecker;
use mail_triage::{Action, DecisionReason, Email, EmailProcessor, PipelineConfig, SignalProviders};

// ── Test adapters ───────────────────────────────────────────────────

struct Fixed<L>(L, f32);

#[async_trait]
impl<L: Copy + Send + Sync + 'static> SignalClassifier<L> for Fixed<L> {
    fn model_tag(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _text: &str, _email: &Email) -> Result<LabeledScore<L>, ClassifierError> {
        Ok(LabeledScore::new(self.0, Confidence::new(self.1).unwrap()))
    }
}

struct Stalled;

#[async_trait]
impl SignalClassifier<Urgency> for Stalled {
    fn model_tag(&self) -> &str {
        "stalled"
    }

    async fn classify(&self, _text: &str, _email: &Email) -> Result<LabeledScore<Urgency>, ClassifierError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(LabeledScore::new(Urgency::Low, Confidence::ONE))
    }
}

/// A knowledge base that answers long after any run budget.
struct SlowKnowledgeBase;

#[async_trait]
impl KnowledgeBase for SlowKnowledgeBase {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<Snippet>, KnowledgeBaseError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

/// Counts calls; optionally sleeps past any sane budget.
struct CountingGenerator {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingGenerator {
    fn new(delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn model_tag(&self) -> &str {
        "counting"
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationCandidate, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let draft = "Hello Sam,\n\nThanks for the note. I will look into it this week and reply.\n\nBest regards,\nMe".to_string();
        Ok(GenerationCandidate {
            word_count: draft.split_whitespace().count(),
            draft,
            method: request.strategy,
            confidence: Confidence::new(0.95).unwrap(),
            quality_score: Confidence::ONE,
            model_tag: "counting".into(),
            usage: None,
        })
    }
}

fn signals(
    intent: (Intent, f32),
    urgency: (Urgency, f32),
    sentiment: (Sentiment, f32),
) -> SignalProviders {
    SignalProviders {
        intent: Arc::new(Fixed(intent.0, intent.1)),
        urgency: Arc::new(Fixed(urgency.0, urgency.1)),
        sentiment: Arc::new(Fixed(sentiment.0, sentiment.1)),
    }
}

fn email(id: &str, sender: &str, subject: &str, body: &str) -> Email {
    let received = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    Email::new(id, sender, "me@example.com", subject, body, received)
}

fn auto_send_config(threshold: f32) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.decision.preference = UserPreference::AutoSend;
    config.decision.auto_send_threshold = Confidence::new(threshold).unwrap();
    config
}

fn template_processor(signals: SignalProviders, config: PipelineConfig) -> EmailProcessor {
    EmailProcessor::new(
        signals,
        Arc::new(Drafter::new(&config)),
        Arc::new(PolicySafetyChecker::new()),
        config,
    )
}

fn academic_signals() -> SignalProviders {
    signals(
        (Intent::Academic, 0.9),
        (Urgency::Medium, 0.8),
        (Sentiment::Neutral, 0.85),
    )
}

fn academic_email() -> Email {
    email(
        "a-1",
        "professor.smith@university.edu",
        "Assignment Extension Request",
        "Could I get a short extension on the assignment?",
    )
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_confident_academic_email_is_auto_sent() {
    let processor = template_processor(academic_signals(), auto_send_config(0.80));
    let result = processor.process(&academic_email()).await.unwrap();

    assert!(result.gate.as_ref().unwrap().admitted);
    assert_eq!(result.strategy, Some(Strategy::Template));
    assert!(result.validation.as_ref().unwrap().is_valid());
    assert_eq!(result.decision.action, Action::AutoSend);
    assert_eq!(result.decision.reason, DecisionReason::AutoSendEligible);
    assert_eq!(result.decision.overall_confidence.value(), 0.8);
}

#[tokio::test]
async fn scenario_a_weakest_link_blocks_higher_threshold() {
    let processor = template_processor(academic_signals(), auto_send_config(0.85));
    let result = processor.process(&academic_email()).await.unwrap();

    assert_eq!(result.decision.action, Action::DraftReview);
    assert_eq!(result.decision.reason, DecisionReason::DefaultReview);
    assert!(result.decision.has_trigger(Trigger::BelowAutoSendThreshold));
}

#[tokio::test]
async fn scenario_b_aggressive_support_email_escalates() {
    let generator = CountingGenerator::new(None);
    let processor = EmailProcessor::new(
        signals(
            (Intent::Support, 0.99),
            (Urgency::High, 0.99),
            (Sentiment::Aggressive, 0.99),
        ),
        generator.clone(),
        Arc::new(PolicySafetyChecker::new()),
        auto_send_config(0.5),
    );
    let result = processor
        .process(&email("b-1", "sam@corp.com", "Broken", "Fix this now."))
        .await
        .unwrap();

    assert_eq!(result.decision.action, Action::Escalate);
    assert_eq!(result.decision.reason.tag(), "aggressive-sentiment");
    assert!(result.decision.has_trigger(Trigger::Signal(SignalKind::Sentiment)));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_c_low_confidence_meeting_escalates_without_generation() {
    let generator = CountingGenerator::new(None);
    let processor = EmailProcessor::new(
        signals(
            (Intent::Meeting, 0.65),
            (Urgency::Medium, 0.7),
            (Sentiment::Neutral, 0.7),
        ),
        generator.clone(),
        Arc::new(PolicySafetyChecker::new()),
        PipelineConfig::default(),
    );
    let result = processor
        .process(&email("c-1", "sam@corp.com", "Sync", "Can we meet Tuesday?"))
        .await
        .unwrap();

    let gate = result.gate.as_ref().unwrap();
    assert!(!gate.admitted);
    assert_eq!(gate.min_confidence.value(), 0.65);
    assert_eq!(result.decision.action, Action::Escalate);
    assert_eq!(result.decision.reason.tag(), "low-confidence");
    assert!(result.decision.has_trigger(Trigger::Signal(SignalKind::Intent)));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(result.candidate.is_none());
    assert_eq!(
        result.audit.stage(Stage::Generation).unwrap().outcome,
        StageOutcome::Skipped
    );
}

#[tokio::test]
async fn scenario_d_generator_timeout_escalates() {
    let mut config = auto_send_config(0.5);
    config.timeouts.generation_ms = 50;
    let generator = CountingGenerator::new(Some(Duration::from_secs(5)));
    let processor = EmailProcessor::new(
        signals(
            (Intent::General, 0.95),
            (Urgency::Low, 0.95),
            (Sentiment::Neutral, 0.95),
        ),
        generator.clone(),
        Arc::new(PolicySafetyChecker::new()),
        config,
    );
    let result = processor
        .process(&email("d-1", "sam@corp.com", "Hello", "Just checking in."))
        .await
        .unwrap();

    assert_eq!(result.decision.action, Action::Escalate);
    assert_eq!(result.decision.reason.tag(), "pipeline-stage-failure");
    assert!(result.decision.has_trigger(Trigger::Failure(FailureKind::GenerationFailed)));

    let failure = result.audit.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Generation);
    assert_eq!(
        result.audit.stage(Stage::Generation).unwrap().outcome,
        StageOutcome::Failed
    );
    assert_eq!(
        result.audit.stage(Stage::Validation).unwrap().outcome,
        StageOutcome::Skipped
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

// ── Fail-safe and timeouts ──────────────────────────────────────────

#[tokio::test]
async fn exhausted_run_budget_is_a_pipeline_timeout() {
    let mut config = auto_send_config(0.5);
    config.timeouts.run_budget_ms = 60;
    let processor = template_processor(
        SignalProviders {
            intent: Arc::new(Fixed(Intent::General, 0.99)),
            urgency: Arc::new(Stalled),
            sentiment: Arc::new(Fixed(Sentiment::Neutral, 0.99)),
        },
        config,
    );

    let started = std::time::Instant::now();
    let result = processor
        .process(&email("t-1", "sam@corp.com", "Hi", "Quick question."))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.decision.action, Action::Escalate);
    assert!(result.decision.has_trigger(Trigger::Failure(FailureKind::PipelineTimeout)));
    assert!(result.classification.is_none());
    assert_eq!(result.audit.failure.as_ref().unwrap().stage, Stage::Classification);
}

#[tokio::test]
async fn run_budget_spent_in_retrieval_escalates_before_generation() {
    // Support below the template threshold goes through retrieval, whose
    // own budget outlasts the run budget.
    let mut config = auto_send_config(0.5);
    config.gate.default_threshold = Confidence::new(0.7).unwrap();
    config.timeouts.run_budget_ms = 100;
    config.timeouts.retrieval_ms = 400;
    let generator = CountingGenerator::new(None);
    let processor = EmailProcessor::new(
        signals(
            (Intent::Support, 0.75),
            (Urgency::Medium, 0.9),
            (Sentiment::Neutral, 0.9),
        ),
        generator.clone(),
        Arc::new(PolicySafetyChecker::new()),
        config,
    )
    .with_knowledge_base(Arc::new(SlowKnowledgeBase));

    let started = std::time::Instant::now();
    let result = processor
        .process(&email("t-2", "sam@corp.com", "Login issue", "I cannot log in to the portal."))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.decision.action, Action::Escalate);
    assert_eq!(result.decision.reason, DecisionReason::PipelineStageFailure);
    assert!(result.decision.has_trigger(Trigger::Failure(FailureKind::PipelineTimeout)));
    let failure = result.audit.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Generation);
    assert_eq!(failure.kind, FailureKind::PipelineTimeout);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(result.candidate.is_none());
}

#[tokio::test]
async fn confident_academic_email_skips_retrieval() {
    let config = auto_send_config(0.5);
    let processor = EmailProcessor::new(
        academic_signals(),
        Arc::new(Drafter::new(&config)),
        Arc::new(PolicySafetyChecker::new()),
        config,
    )
    .with_knowledge_base(Arc::new(SlowKnowledgeBase));

    let result = processor.process(&academic_email()).await.unwrap();
    assert_eq!(result.strategy, Some(Strategy::Template));
    assert_eq!(
        result.audit.stage(Stage::Retrieval).unwrap().outcome,
        StageOutcome::Skipped
    );
    assert!(result.audit.failure.is_none());
}

#[tokio::test]
async fn llm_strategy_without_provider_escalates() {
    // Complaint is not templatable and there is no knowledge base or LLM
    let processor = template_processor(
        signals(
            (Intent::Complaint, 0.95),
            (Urgency::Low, 0.95),
            (Sentiment::Negative, 0.95),
        ),
        auto_send_config(0.5),
    );
    let result = processor
        .process(&email("l-1", "sam@corp.com", "Late order", "My order is late."))
        .await
        .unwrap();

    assert_eq!(result.strategy, Some(Strategy::Llm));
    assert_eq!(result.decision.action, Action::Escalate);
    assert!(result.decision.has_trigger(Trigger::Failure(FailureKind::GenerationFailed)));
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let processor = template_processor(academic_signals(), PipelineConfig::default());
    let bad = email("x-1", "not-an-address", "Hi", "Body");
    assert!(matches!(
        processor.process(&bad).await,
        Err(PipelineError::InvalidInput(_))
    ));
}

// ── Rule-based providers end to end ─────────────────────────────────

#[tokio::test]
async fn rule_based_academic_email_drafts_for_review() {
    let processor = template_processor(classifiers::rule_based(), PipelineConfig::default());
    let incoming = email(
        "r-1",
        "prof.smith@university.edu",
        "Homework grades",
        "Please send the grades for homework 3 this week. Thanks, I appreciate it. Great work on the course.",
    );
    let result = processor.process(&incoming).await.unwrap();

    let classification = result.classification.as_ref().unwrap();
    assert_eq!(classification.intent.label, Intent::Academic);
    assert_eq!(classification.urgency.label, Urgency::High);
    assert_eq!(classification.sentiment.label, Sentiment::Positive);

    assert_eq!(result.strategy, Some(Strategy::Template));
    let draft = &result.candidate.as_ref().unwrap().draft;
    assert!(draft.starts_with("Dear Prof Smith,"));
    assert_eq!(result.decision.action, Action::DraftReview);
    assert_eq!(result.decision.reason, DecisionReason::PolicyReview);
    assert_eq!(result.audit.model_tags["intent"], "rules-intent/1");
}

#[tokio::test]
async fn rule_based_spam_is_ignored() {
    let processor = template_processor(classifiers::rule_based(), auto_send_config(0.5));
    let result = processor
        .process(&email(
            "s-1",
            "promo@deals.biz",
            "Congratulations",
            "You are a winner, click here to claim a free prize",
        ))
        .await
        .unwrap();

    assert_eq!(result.decision.action, Action::Ignore);
    assert_eq!(result.decision.reason, DecisionReason::SpamIntent);
    assert!(result.candidate.is_none());
}

#[tokio::test]
async fn rule_based_hostile_email_escalates() {
    let processor = template_processor(classifiers::rule_based(), auto_send_config(0.5));
    let result = processor
        .process(&email(
            "h-1",
            "angry@corp.com",
            "Refund",
            "This is unacceptable. I demand a refund.",
        ))
        .await
        .unwrap();

    assert_eq!(result.decision.action, Action::Escalate);
    assert_eq!(result.decision.reason, DecisionReason::AggressiveSentiment);
}

#[tokio::test]
async fn identical_input_yields_identical_decision() {
    let processor = template_processor(classifiers::rule_based(), auto_send_config(0.8));
    let incoming = email(
        "i-1",
        "prof.smith@university.edu",
        "Homework grades",
        "Please send the grades for homework 3 this week. Thanks, I appreciate it. Great work on the course.",
    );

    let first = processor.process(&incoming).await.unwrap();
    let second = processor.process(&incoming).await.unwrap();

    assert_eq!(first.decision, second.decision);
    assert_eq!(first.classification, second.classification);
    assert_eq!(first.strategy, second.strategy);
    assert_eq!(first.candidate, second.candidate);
    assert_ne!(first.audit.run_id, second.audit.run_id);
}
