//! Configuration types.
//!
//! A `PipelineConfig` is read once per run as an immutable snapshot. Reloads
//! build a new value and swap it in; nothing mutates a config in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::types::{Confidence, Intent};

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub gate: GateConfig,
    pub strategy: StrategyConfig,
    pub validation: ValidationPolicy,
    pub decision: DecisionPolicy,
    pub timeouts: TimeoutConfig,
    /// Maximum emails processed concurrently by `process_batch`.
    pub batch_concurrency: usize,
    /// Name used to sign template replies.
    pub signature_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            strategy: StrategyConfig::default(),
            validation: ValidationPolicy::default(),
            decision: DecisionPolicy::default(),
            timeouts: TimeoutConfig::default(),
            batch_concurrency: 4,
            signature_name: "Me".to_string(),
        }
    }
}

/// Per-intent admission thresholds for the confidence gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub intent_thresholds: BTreeMap<Intent, Confidence>,
    /// Used for intents with no specific entry.
    pub default_threshold: Confidence,
}

impl Default for GateConfig {
    fn default() -> Self {
        let intent_thresholds = [
            (Intent::Academic, 0.80),
            (Intent::Internship, 0.75),
            (Intent::Meeting, 0.70),
            (Intent::Spam, 0.0),
        ]
        .into_iter()
        .map(|(intent, value)| (intent, Confidence::saturating(value)))
        .collect();

        Self {
            intent_thresholds,
            default_threshold: Confidence::saturating(0.85),
        }
    }
}

impl GateConfig {
    pub fn threshold_for(&self, intent: Intent) -> Confidence {
        self.intent_thresholds
            .get(&intent)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

/// Eligibility sets for the generation strategy selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Intents simple enough for a canned template.
    pub template_intents: BTreeSet<Intent>,
    /// Intents with domain knowledge worth retrieving.
    pub rag_intents: BTreeSet<Intent>,
    /// Minimum classification confidence for the template path (inclusive).
    pub template_threshold: Confidence,
    /// Snippets requested from the knowledge base.
    pub rag_top_k: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            template_intents: [
                Intent::Academic,
                Intent::Internship,
                Intent::Meeting,
                Intent::Support,
                Intent::General,
            ]
            .into_iter()
            .collect(),
            rag_intents: [Intent::Academic, Intent::Internship, Intent::Support]
                .into_iter()
                .collect(),
            template_threshold: Confidence::saturating(0.80),
            rag_top_k: 3,
        }
    }
}

/// Bounds applied by the validation chain. All bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub min_confidence: Confidence,
    pub min_quality: Confidence,
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_confidence: Confidence::saturating(0.6),
            min_quality: Confidence::saturating(0.5),
            min_words: 10,
            max_words: 500,
        }
    }
}

/// User's standing instruction for drafts that pass validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPreference {
    /// Every draft goes to a human.
    #[default]
    AlwaysReview,
    /// Confident drafts may be sent without review.
    AutoSend,
}

impl FromStr for UserPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always_review" | "always-review" | "review" => Ok(Self::AlwaysReview),
            "auto_send" | "auto-send" | "auto" => Ok(Self::AutoSend),
            other => Err(format!("Unknown user preference: {other}")),
        }
    }
}

/// Auto-send opt-in for the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    pub preference: UserPreference,
    /// Weakest-link confidence required for AUTO_SEND (inclusive).
    pub auto_send_threshold: Confidence,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            preference: UserPreference::AlwaysReview,
            auto_send_threshold: Confidence::saturating(0.90),
        }
    }
}

/// Wall-clock budgets, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for a whole run.
    pub run_budget_ms: u64,
    pub classification_ms: u64,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub safety_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            run_budget_ms: 1000,
            classification_ms: 300,
            retrieval_ms: 200,
            generation_ms: 600,
            safety_ms: 200,
        }
    }
}

impl TimeoutConfig {
    pub fn run_budget(&self) -> Duration {
        Duration::from_millis(self.run_budget_ms)
    }

    pub fn classification(&self) -> Duration {
        Duration::from_millis(self.classification_ms)
    }

    pub fn retrieval(&self) -> Duration {
        Duration::from_millis(self.retrieval_ms)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }

    pub fn safety(&self) -> Duration {
        Duration::from_millis(self.safety_ms)
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing sections take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `TRIAGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from a key lookup (the environment, in production).
    ///
    /// Recognised keys: `TRIAGE_AUTO_SEND_THRESHOLD`, `TRIAGE_USER_PREFERENCE`,
    /// `TRIAGE_DEFAULT_THRESHOLD`, `TRIAGE_RUN_BUDGET_MS`,
    /// `TRIAGE_SIGNATURE_NAME`, `TRIAGE_BATCH_CONCURRENCY`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("TRIAGE_AUTO_SEND_THRESHOLD") {
            self.decision.auto_send_threshold =
                parse_confidence("TRIAGE_AUTO_SEND_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("TRIAGE_USER_PREFERENCE") {
            self.decision.preference =
                raw.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "TRIAGE_USER_PREFERENCE".into(),
                    message,
                })?;
        }
        if let Some(raw) = lookup("TRIAGE_DEFAULT_THRESHOLD") {
            self.gate.default_threshold = parse_confidence("TRIAGE_DEFAULT_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("TRIAGE_RUN_BUDGET_MS") {
            self.timeouts.run_budget_ms = parse_number("TRIAGE_RUN_BUDGET_MS", &raw)?;
        }
        if let Some(raw) = lookup("TRIAGE_SIGNATURE_NAME") {
            self.signature_name = raw.trim().to_string();
        }
        if let Some(raw) = lookup("TRIAGE_BATCH_CONCURRENCY") {
            self.batch_concurrency = parse_number("TRIAGE_BATCH_CONCURRENCY", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject internally inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.validation;
        if v.min_words > v.max_words {
            return Err(ConfigError::InvalidValue {
                key: "validation.min_words".into(),
                message: format!("min_words {} exceeds max_words {}", v.min_words, v.max_words),
            });
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.timeouts.run_budget_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeouts.run_budget_ms".into(),
                message: "must be positive".into(),
            });
        }
        if self.strategy.rag_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "strategy.rag_top_k".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse_confidence(key: &str, raw: &str) -> Result<Confidence, ConfigError> {
    let value: f32 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("{e}"),
    })?;
    Confidence::new(value).map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: e.to_string(),
    })
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.into(),
        message: e.to_string(),
    })
}
