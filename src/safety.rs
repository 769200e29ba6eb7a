//! Content policy for outgoing drafts.
//!
//! `PolicySafetyChecker` is the default `SafetyChecker`: inappropriate
//! language, personal data that must never leave in a reply, and hostile
//! phrasing all make a draft unsafe.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::classifiers::{Keywords, normalize};
use crate::error::SafetyError;
use crate::pipeline::traits::SafetyChecker;

const MODEL_TAG: &str = "policy-safety/1";

const INAPPROPRIATE: &[&str] = &["damn", "hell", "crap", "stupid", "idiot"];

const HOSTILE: &[&str] = &[
    "shut up",
    "how dare you",
    "you people",
    "not my problem",
    "stop wasting my time",
    "deal with it",
];

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid regex"));
// 13 to 16 digits, optionally grouped by spaces or dashes
static CARD_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("valid regex"));

/// Why a draft was judged unsafe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Inappropriate(&'static str),
    Pii(&'static str),
    Hostile(&'static str),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inappropriate(word) => write!(f, "inappropriate word '{word}'"),
            Self::Pii(kind) => write!(f, "contains {kind}"),
            Self::Hostile(phrase) => write!(f, "hostile phrasing '{phrase}'"),
        }
    }
}

pub struct PolicySafetyChecker {
    inappropriate: Keywords,
    hostile: Keywords,
}

impl PolicySafetyChecker {
    pub fn new() -> Self {
        Self {
            inappropriate: Keywords::new(INAPPROPRIATE),
            hostile: Keywords::new(HOSTILE),
        }
    }

    /// Every policy violation in `text`, in check order.
    pub fn violations(&self, text: &str) -> Vec<Violation> {
        let normalized = normalize(text);
        let mut found: Vec<Violation> = self
            .inappropriate
            .matches(&normalized)
            .into_iter()
            .map(Violation::Inappropriate)
            .collect();

        if SSN.is_match(text) {
            found.push(Violation::Pii("a social security number"));
        }
        if CARD_NUMBER.is_match(text) {
            found.push(Violation::Pii("a card number"));
        }

        found.extend(
            self.hostile
                .matches(&normalized)
                .into_iter()
                .map(Violation::Hostile),
        );
        found
    }
}

impl Default for PolicySafetyChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SafetyChecker for PolicySafetyChecker {
    fn model_tag(&self) -> &str {
        MODEL_TAG
    }

    async fn is_safe(&self, text: &str) -> Result<bool, SafetyError> {
        let violations = self.violations(text);
        if violations.is_empty() {
            return Ok(true);
        }
        let summary: Vec<String> = violations.iter().map(ToString::to_string).collect();
        warn!(violations = %summary.join("; "), "Draft failed safety policy");
        Ok(false)
    }
}
