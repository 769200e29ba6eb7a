//! Keyword and deadline urgency detector.
//!
//! Order: critical keywords, then deadline phrases, then high and medium
//! keywords. Anything else is low urgency.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Month, NaiveDate, Utc, Weekday};
use regex::Regex;
use tracing::debug;

use super::{Keywords, normalize};
use crate::error::ClassifierError;
use crate::pipeline::traits::SignalClassifier;
use crate::pipeline::types::{Confidence, Email, LabeledScore, Urgency};

const MODEL_TAG: &str = "rules-urgency/1";

const CRITICAL: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "emergency",
    "critical",
    "right now",
    "today",
    "within hours",
];

const HIGH: &[&str] = &[
    "soon",
    "quickly",
    "tomorrow",
    "by tomorrow",
    "this week",
    "deadline",
    "due",
    "time-sensitive",
];

const MEDIUM: &[&str] = &[
    "next week",
    "upcoming",
    "when you can",
    "at your convenience",
];

static DEADLINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bdeadline\s+(?:is\s+)?(?:on\s+)?\w+\s+\d+",
        r"(?i)\bdue\s+(?:on\s+)?\w+\s+\d+",
        r"(?i)\bby\s+\w+\s+\d+",
        r"(?i)\bbefore\s+\w+\s+\d+",
        r"(?i)\b(?:by|before|on|until|due)\s+(?:this\s+|next\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        r"(?i)\b(?:in|within)\s+\d+\s+days?\b",
        r"(?i)\b(?:today|tomorrow|tonight)\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("deadline pattern is a valid regex"))
    .collect()
});

static DAYS_AHEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:in|within)\s+(\d+)\s+days?\b").expect("valid regex"));

/// Phrases that name a date we cannot place ("by chapter 3").
const UNRESOLVED_DAYS: u32 = 7;

/// A deadline mention and how far away it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    pub text: String,
    pub days_until: u32,
}

/// First deadline phrase in the text, resolved against the day the email
/// arrived. Phrases that cannot be placed on a calendar count as a week out.
pub fn detect_deadline(text: &str, received_at: DateTime<Utc>) -> Option<Deadline> {
    let received = received_at.date_naive();
    DEADLINE_PATTERNS.iter().find_map(|pattern| {
        pattern.find(text).map(|m| Deadline {
            text: m.as_str().to_string(),
            days_until: days_until(m.as_str(), received),
        })
    })
}

fn days_until(phrase: &str, received: NaiveDate) -> u32 {
    let lower = phrase.to_lowercase();
    if lower.contains("today") || lower.contains("tonight") {
        return 0;
    }
    if lower.contains("tomorrow") {
        return 1;
    }
    if let Some(days) = DAYS_AHEAD
        .captures(&lower)
        .and_then(|caps| caps[1].parse().ok())
    {
        return days;
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(date) = calendar_date(&words, received) {
        return u32::try_from((date - received).num_days()).unwrap_or(0);
    }
    if let Some(weekday) = words.iter().find_map(|w| w.parse::<Weekday>().ok()) {
        let ahead = (7 + weekday.num_days_from_monday()
            - received.weekday().num_days_from_monday())
            % 7;
        return if words.contains(&"next") { ahead + 7 } else { ahead };
    }
    UNRESOLVED_DAYS
}

/// "March 12", "jan 3rd": the next such date on or after `received`.
fn calendar_date(words: &[&str], received: NaiveDate) -> Option<NaiveDate> {
    words.windows(2).find_map(|pair| {
        let month = pair[0].parse::<Month>().ok()?.number_from_month();
        let day: u32 = pair[1]
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .ok()?;
        match NaiveDate::from_ymd_opt(received.year(), month, day)? {
            date if date >= received => Some(date),
            _ => NaiveDate::from_ymd_opt(received.year() + 1, month, day),
        }
    })
}

pub struct RuleUrgencyDetector {
    critical: Keywords,
    high: Keywords,
    medium: Keywords,
}

impl RuleUrgencyDetector {
    pub fn new() -> Self {
        Self {
            critical: Keywords::new(CRITICAL),
            high: Keywords::new(HIGH),
            medium: Keywords::new(MEDIUM),
        }
    }

    pub fn evaluate(&self, text: &str, email: &Email) -> LabeledScore<Urgency> {
        let normalized = normalize(text);

        let critical = self.critical.matches(&normalized);
        if !critical.is_empty() {
            return scored(
                Urgency::Critical,
                0.95,
                format!("critical keywords: {}", critical.join(", ")),
            );
        }

        if let Some(deadline) = detect_deadline(text, email.received_at) {
            let (urgency, confidence) = match deadline.days_until {
                0..=1 => (Urgency::Critical, 0.90),
                2..=3 => (Urgency::High, 0.85),
                _ => (Urgency::Medium, 0.75),
            };
            return scored(
                urgency,
                confidence,
                format!(
                    "deadline '{}' in {} day(s)",
                    deadline.text, deadline.days_until
                ),
            );
        }

        let high = self.high.matches(&normalized);
        if !high.is_empty() {
            return scored(
                Urgency::High,
                0.80,
                format!("high-urgency keywords: {}", high.join(", ")),
            );
        }

        let medium = self.medium.matches(&normalized);
        if !medium.is_empty() {
            return scored(
                Urgency::Medium,
                0.70,
                format!("medium-urgency keywords: {}", medium.join(", ")),
            );
        }

        scored(Urgency::Low, 0.65, "no urgency indicators".to_string())
    }
}

impl Default for RuleUrgencyDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalClassifier<Urgency> for RuleUrgencyDetector {
    fn model_tag(&self) -> &str {
        MODEL_TAG
    }

    async fn classify(
        &self,
        text: &str,
        metadata: &Email,
    ) -> Result<LabeledScore<Urgency>, ClassifierError> {
        let score = self.evaluate(text, metadata);
        debug!(
            id = %metadata.id,
            urgency = %score.label,
            confidence = %score.confidence,
            "Urgency detected"
        );
        Ok(score)
    }
}

fn scored(urgency: Urgency, confidence: f32, reasoning: String) -> LabeledScore<Urgency> {
    LabeledScore::new(urgency, Confidence::saturating(confidence)).with_reasoning(reasoning)
}
