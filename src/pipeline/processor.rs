//! Email processor: runs one email from classification to decision.
//!
//! **Core invariant: no code path defaults to AUTO_SEND on partial failure.**
//! Every collaborator error or timeout is caught here and turned into an
//! ESCALATE decision with the failure recorded in the audit trail. The only
//! error returned to callers is malformed input.
//!
//! Flow:
//! 1. Classification: intent, urgency, sentiment dispatched concurrently
//! 2. Confidence gate → may short-circuit to the decision
//! 3. Knowledge-base retrieval (RAG intents only)
//! 4. Strategy selection → generation
//! 5. Validation chain
//! 6. Decision table → audit record frozen

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::error::Elapsed;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ClassifierError, ConfigError, PipelineError};
use crate::pipeline::audit::AuditRecorder;
use crate::pipeline::decision::{self, GenerationStatus};
use crate::pipeline::gate::{self, GateResult};
use crate::pipeline::strategy;
use crate::pipeline::traits::{Generator, KnowledgeBase, SafetyChecker, SignalClassifier};
use crate::pipeline::types::{
    ClassificationResult, Decision, Email, FailureKind, GenerationCandidate, GenerationRequest,
    Intent, LabeledScore, ProcessedEmail, Sentiment, SignalKind, Snippet, Stage, StageFailure,
    Strategy, Urgency, ValidationOutcome,
};
use crate::pipeline::validation::ValidationChain;

/// The three signal providers consulted for every email.
#[derive(Clone)]
pub struct SignalProviders {
    pub intent: Arc<dyn SignalClassifier<Intent>>,
    pub urgency: Arc<dyn SignalClassifier<Urgency>>,
    pub sentiment: Arc<dyn SignalClassifier<Sentiment>>,
}

/// Pipeline orchestrator.
///
/// Runs are independent: the only state shared between concurrent runs is
/// the configuration snapshot, which is replaced wholesale on reload.
pub struct EmailProcessor {
    signals: SignalProviders,
    generator: Arc<dyn Generator>,
    safety: Arc<dyn SafetyChecker>,
    knowledge_base: Option<Arc<dyn KnowledgeBase>>,
    config: RwLock<Arc<PipelineConfig>>,
}

impl EmailProcessor {
    pub fn new(
        signals: SignalProviders,
        generator: Arc<dyn Generator>,
        safety: Arc<dyn SafetyChecker>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            signals,
            generator,
            safety,
            knowledge_base: None,
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Enable the RAG strategy.
    pub fn with_knowledge_base(mut self, knowledge_base: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<PipelineConfig> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new configuration for future runs. Runs already in flight
    /// keep the snapshot they started with.
    pub fn reload_config(&self, config: PipelineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        info!("Pipeline configuration reloaded");
        Ok(())
    }

    /// Process a single email through the full pipeline.
    pub async fn process(&self, email: &Email) -> Result<ProcessedEmail, PipelineError> {
        email.validate()?;

        let config = self.config();
        let run_deadline = Instant::now() + config.timeouts.run_budget();
        let mut run = Run::start(email);

        run.audit.tag_model("intent", self.signals.intent.model_tag());
        run.audit.tag_model("urgency", self.signals.urgency.model_tag());
        run.audit.tag_model("sentiment", self.signals.sentiment.model_tag());

        info!(
            id = %email.id,
            run_id = %run.audit.run_id(),
            sender = %email.sender,
            "Processing email"
        );

        // Step 1: classification (concurrent fan-out, joined before the gate)
        let started = Instant::now();
        let classification = match self.classify(email, &config, run_deadline).await {
            Ok(classification) => {
                run.audit.completed(
                    Stage::Classification,
                    started,
                    format!(
                        "intent={} ({}), urgency={} ({}), sentiment={} ({})",
                        classification.intent.label,
                        classification.intent.confidence,
                        classification.urgency.label,
                        classification.urgency.confidence,
                        classification.sentiment.label,
                        classification.sentiment.confidence,
                    ),
                );
                classification
            }
            Err(failure) => {
                warn!(id = %email.id, failure = %failure, "Classification failed, escalating");
                run.audit.failed(&failure, started);
                run.skip(
                    &[
                        Stage::Gate,
                        Stage::Retrieval,
                        Stage::StrategySelection,
                        Stage::Generation,
                        Stage::Validation,
                    ],
                    "classification unavailable",
                );
                return Ok(run.conclude(decision::fail_safe(&failure)));
            }
        };

        // Step 2: confidence gate
        let started = Instant::now();
        let gate = gate::admit(&classification, &config.gate);
        run.audit.completed(Stage::Gate, started, gate_detail(&gate));
        run.classification = Some(classification.clone());
        run.gate = Some(gate.clone());

        if !gate.admitted {
            run.skip(
                &[
                    Stage::Retrieval,
                    Stage::StrategySelection,
                    Stage::Generation,
                    Stage::Validation,
                ],
                "gate did not admit email",
            );
            let decision = decision::decide(
                &classification,
                &gate,
                GenerationStatus::NotAttempted,
                &config.decision,
            );
            return Ok(run.conclude(decision));
        }

        // Step 3: retrieval, which decides knowledge-base availability
        let snippets = self
            .retrieve(email, &classification, &gate, &config, run_deadline, &mut run.audit)
            .await;

        // Step 4: strategy selection and generation
        let started = Instant::now();
        let strategy = strategy::select(&classification, &gate, !snippets.is_empty(), &config.strategy);
        run.audit.completed(Stage::StrategySelection, started, strategy.label());
        run.strategy = Some(strategy);
        run.audit.tag_model("generator", self.generator.model_tag());

        let request = GenerationRequest {
            strategy,
            email,
            classification: &classification,
            context: (strategy == Strategy::Rag).then_some(snippets.as_slice()),
        };

        let started = Instant::now();
        let candidate = match self.generate(request, &config, run_deadline).await {
            Ok(candidate) => {
                run.audit.completed(
                    Stage::Generation,
                    started,
                    format!(
                        "{} draft, {} words, confidence {}",
                        candidate.method, candidate.word_count, candidate.confidence
                    ),
                );
                candidate
            }
            Err(failure) => {
                warn!(id = %email.id, failure = %failure, "Generation failed, escalating");
                run.audit.failed(&failure, started);
                run.skip(&[Stage::Validation], "no draft to validate");
                let decision = decision::decide(
                    &classification,
                    &gate,
                    GenerationStatus::Failed(&failure),
                    &config.decision,
                );
                return Ok(run.conclude(decision));
            }
        };

        // Step 5: validation
        let started = Instant::now();
        run.audit.tag_model("safety", self.safety.model_tag());
        if let Some(failure) = budget_exhausted(Stage::Validation, run_deadline) {
            warn!(id = %email.id, failure = %failure, "Run budget spent before validation, escalating");
            run.audit.failed(&failure, started);
            let decision = decision::decide(
                &classification,
                &gate,
                GenerationStatus::Failed(&failure),
                &config.decision,
            );
            run.candidate = Some(candidate);
            return Ok(run.conclude(decision));
        }

        let safety_deadline = stage_deadline(config.timeouts.safety(), run_deadline);
        let validation = ValidationChain::new(&config.validation, self.safety.as_ref())
            .validate(&candidate, safety_deadline)
            .await;

        let timed_out = if let Some(errored) = validation.errored() {
            let kind = failure_kind(FailureKind::ValidationCheckError, run_deadline);
            let failure = StageFailure::new(Stage::Validation, kind, errored.detail.clone());
            warn!(id = %email.id, failure = %failure, "Validation check errored, escalating");
            run.audit.failed(&failure, started);
            (kind == FailureKind::PipelineTimeout).then_some(failure)
        } else if let Some(failure) = budget_exhausted(Stage::Validation, run_deadline) {
            warn!(id = %email.id, failure = %failure, "Validation finished past the run budget, escalating");
            run.audit.failed(&failure, started);
            Some(failure)
        } else {
            run.audit
                .completed(Stage::Validation, started, validation_detail(&validation));
            None
        };

        // Step 6: decision
        let status = match &timed_out {
            Some(failure) => GenerationStatus::Failed(failure),
            None => GenerationStatus::Produced {
                candidate: &candidate,
                validation: &validation,
            },
        };
        let decision = decision::decide(&classification, &gate, status, &config.decision);

        run.candidate = Some(candidate);
        run.validation = Some(validation);
        Ok(run.conclude(decision))
    }

    /// Process many emails concurrently, at most `batch_concurrency` at a
    /// time. Results come back in input order; invalid emails are logged
    /// and skipped.
    pub async fn process_batch(&self, emails: &[Email]) -> Vec<ProcessedEmail> {
        let count = emails.len();
        let concurrency = self.config().batch_concurrency.max(1);
        info!(count, concurrency, "Processing email batch");

        let runs: Vec<_> = emails.iter().map(|email| self.process(email)).collect();
        let outcomes: Vec<_> = stream::iter(runs).buffered(concurrency).collect().await;

        let mut results = Vec::with_capacity(count);
        for (email, outcome) in emails.iter().zip(outcomes) {
            match outcome {
                Ok(processed) => results.push(processed),
                Err(e) => error!(id = %email.id, error = %e, "Skipping invalid email in batch"),
            }
        }

        info!(
            processed = results.len(),
            total = count,
            "Batch processing complete"
        );
        results
    }

    async fn classify(
        &self,
        email: &Email,
        config: &PipelineConfig,
        run_deadline: Instant,
    ) -> Result<ClassificationResult, StageFailure> {
        let text = email.classification_text();
        let deadline = stage_deadline(config.timeouts.classification(), run_deadline);

        let (intent, urgency, sentiment) = tokio::join!(
            timeout_at(deadline, self.signals.intent.classify(&text, email)),
            timeout_at(deadline, self.signals.urgency.classify(&text, email)),
            timeout_at(deadline, self.signals.sentiment.classify(&text, email)),
        );

        Ok(ClassificationResult::new(
            signal_score(SignalKind::Intent, intent, run_deadline)?,
            signal_score(SignalKind::Urgency, urgency, run_deadline)?,
            signal_score(SignalKind::Sentiment, sentiment, run_deadline)?,
        ))
    }

    /// Fetch context when the RAG rule could apply. Any failure means "no
    /// knowledge available" rather than a stage failure.
    async fn retrieve(
        &self,
        email: &Email,
        classification: &ClassificationResult,
        gate: &GateResult,
        config: &PipelineConfig,
        run_deadline: Instant,
        audit: &mut AuditRecorder,
    ) -> Vec<Snippet> {
        let Some(knowledge_base) = &self.knowledge_base else {
            audit.skipped(Stage::Retrieval, "no knowledge base configured");
            return Vec::new();
        };
        if !strategy::wants_retrieval(classification, gate, &config.strategy) {
            audit.skipped(
                Stage::Retrieval,
                format!("not needed for intent {}", classification.intent.label),
            );
            return Vec::new();
        }

        let started = Instant::now();
        let deadline = stage_deadline(config.timeouts.retrieval(), run_deadline);
        let query = retrieval_query(email, classification);

        match timeout_at(deadline, knowledge_base.retrieve(&query, config.strategy.rag_top_k)).await
        {
            Ok(Ok(snippets)) => {
                debug!(id = %email.id, count = snippets.len(), "Knowledge base retrieval");
                audit.completed(
                    Stage::Retrieval,
                    started,
                    format!("{} snippets", snippets.len()),
                );
                snippets
            }
            Ok(Err(e)) => {
                warn!(id = %email.id, error = %e, "Knowledge base lookup failed, continuing without context");
                audit.completed(Stage::Retrieval, started, format!("unavailable: {e}"));
                Vec::new()
            }
            Err(_) => {
                warn!(id = %email.id, "Knowledge base lookup timed out, continuing without context");
                audit.completed(Stage::Retrieval, started, "unavailable: timed out");
                Vec::new()
            }
        }
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
        config: &PipelineConfig,
        run_deadline: Instant,
    ) -> Result<GenerationCandidate, StageFailure> {
        if let Some(failure) = budget_exhausted(Stage::Generation, run_deadline) {
            return Err(failure);
        }
        let budget = config.timeouts.generation();
        let deadline = stage_deadline(budget, run_deadline);

        match timeout_at(deadline, self.generator.generate(request)).await {
            Ok(Ok(_)) if Instant::now() >= run_deadline => Err(StageFailure::new(
                Stage::Generation,
                FailureKind::PipelineTimeout,
                format!("{} generator finished past the run budget", request.strategy),
            )),
            Ok(Ok(candidate)) if candidate.draft.trim().is_empty() => Err(StageFailure::new(
                Stage::Generation,
                FailureKind::GenerationFailed,
                format!("{} generator returned an empty draft", request.strategy),
            )),
            Ok(Ok(candidate)) => Ok(candidate),
            Ok(Err(e)) => Err(StageFailure::new(
                Stage::Generation,
                FailureKind::GenerationFailed,
                e.to_string(),
            )),
            Err(_) => Err(StageFailure::new(
                Stage::Generation,
                failure_kind(FailureKind::GenerationFailed, run_deadline),
                format!(
                    "{} generator timed out (budget {}ms)",
                    request.strategy,
                    budget.as_millis()
                ),
            )),
        }
    }
}

// ── Per-run state ───────────────────────────────────────────────────

/// Artifacts accumulated by one run, owned exclusively by that run.
struct Run {
    email_id: String,
    audit: AuditRecorder,
    classification: Option<ClassificationResult>,
    gate: Option<GateResult>,
    strategy: Option<Strategy>,
    candidate: Option<GenerationCandidate>,
    validation: Option<ValidationOutcome>,
}

impl Run {
    fn start(email: &Email) -> Self {
        Self {
            email_id: email.id.clone(),
            audit: AuditRecorder::start(&email.id),
            classification: None,
            gate: None,
            strategy: None,
            candidate: None,
            validation: None,
        }
    }

    fn skip(&mut self, stages: &[Stage], reason: &str) {
        for stage in stages {
            self.audit.skipped(*stage, reason);
        }
    }

    fn conclude(mut self, decision: Decision) -> ProcessedEmail {
        self.audit.completed(
            Stage::Decision,
            Instant::now(),
            format!("{} ({})", decision.action, decision.reason),
        );
        let audit = self.audit.finish();

        info!(
            id = %self.email_id,
            run_id = %audit.run_id,
            action = %decision.action,
            reason = %decision.reason,
            overall_confidence = %decision.overall_confidence,
            duration_ms = audit.total_duration_ms,
            "Email decision"
        );

        ProcessedEmail {
            email_id: self.email_id,
            classification: self.classification,
            gate: self.gate,
            strategy: self.strategy,
            candidate: self.candidate,
            validation: self.validation,
            decision,
            audit,
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// The earlier of a stage budget and the run deadline.
fn stage_deadline(budget: Duration, run_deadline: Instant) -> Instant {
    (Instant::now() + budget).min(run_deadline)
}

/// A stage-specific failure, or `PipelineTimeout` once the run budget is spent.
fn failure_kind(stage_kind: FailureKind, run_deadline: Instant) -> FailureKind {
    if Instant::now() >= run_deadline {
        FailureKind::PipelineTimeout
    } else {
        stage_kind
    }
}

/// `PipelineTimeout` for `stage` when the run budget is already spent. A
/// collaborator that is ready on first poll never trips its own timeout.
fn budget_exhausted(stage: Stage, run_deadline: Instant) -> Option<StageFailure> {
    (Instant::now() >= run_deadline).then(|| {
        StageFailure::new(
            stage,
            FailureKind::PipelineTimeout,
            format!("run budget spent by the {stage} stage"),
        )
    })
}

fn signal_score<L>(
    kind: SignalKind,
    result: Result<Result<LabeledScore<L>, ClassifierError>, Elapsed>,
    run_deadline: Instant,
) -> Result<LabeledScore<L>, StageFailure> {
    match result {
        Ok(Ok(score)) => Ok(score),
        Ok(Err(e)) => Err(StageFailure::new(
            Stage::Classification,
            FailureKind::SignalUnavailable,
            format!("{kind} classifier failed: {e}"),
        )),
        Err(_) => Err(StageFailure::new(
            Stage::Classification,
            failure_kind(FailureKind::SignalUnavailable, run_deadline),
            format!("{kind} classifier timed out"),
        )),
    }
}

fn retrieval_query(email: &Email, classification: &ClassificationResult) -> String {
    format!(
        "{} {}",
        classification.intent.label,
        email.classification_text()
    )
}

fn gate_detail(gate: &GateResult) -> String {
    match (gate.admitted, gate.veto) {
        (true, _) => format!("admitted ({} >= {})", gate.min_confidence, gate.threshold),
        (false, Some(veto)) => format!("vetoed: {veto:?}"),
        (false, None) => format!(
            "rejected ({} < {}, weakest {})",
            gate.min_confidence,
            gate.threshold,
            gate.failing_signal.map(|s| s.label()).unwrap_or("unknown"),
        ),
    }
}

fn validation_detail(validation: &ValidationOutcome) -> String {
    match validation.first_failure() {
        None => "all checks passed".to_string(),
        Some(failed) => format!("{} failed: {}", failed.check, failed.detail),
    }
}
