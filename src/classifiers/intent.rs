//! Keyword intent classifier.
//!
//! Rules fire in priority order, spam first. An `.edu` sender is academic
//! even without an academic keyword.

use async_trait::async_trait;
use tracing::debug;

use super::{Keywords, normalize};
use crate::error::ClassifierError;
use crate::pipeline::traits::SignalClassifier;
use crate::pipeline::types::{Confidence, Email, Intent, LabeledScore};

const MODEL_TAG: &str = "rules-intent/1";

const SPAM: &[&str] = &[
    "unsubscribe",
    "discount",
    "limited offer",
    "click here",
    "winner",
    "prize",
    "free",
    "congratulations",
    "act now",
];

const ACADEMIC: &[&str] = &[
    "professor",
    "assignment",
    "exam",
    "grade",
    "course",
    "class",
    "homework",
    "lecture",
    "syllabus",
    "office hours",
];

const INTERNSHIP: &[&str] = &[
    "interview",
    "position",
    "application",
    "resume",
    "cv",
    "hiring",
    "job",
    "opportunity",
    "candidate",
    "recruiter",
];

const MEETING: &[&str] = &[
    "meeting",
    "schedule",
    "calendar",
    "available",
    "appointment",
    "call",
    "zoom",
    "teams",
    "conference",
    "sync",
];

const SUPPORT: &[&str] = &[
    "help",
    "issue",
    "problem",
    "support",
    "assistance",
    "question",
    "how to",
    "not working",
    "error",
];

const COMPLAINT: &[&str] = &[
    "disappointed",
    "unacceptable",
    "terrible",
    "worst",
    "complaint",
    "unsatisfied",
    "refund",
    "cancel",
];

pub struct RuleIntentClassifier {
    spam: Keywords,
    academic: Keywords,
    internship: Keywords,
    meeting: Keywords,
    support: Keywords,
    complaint: Keywords,
}

impl RuleIntentClassifier {
    pub fn new() -> Self {
        Self {
            spam: Keywords::new(SPAM),
            academic: Keywords::new(ACADEMIC),
            internship: Keywords::new(INTERNSHIP),
            meeting: Keywords::new(MEETING),
            support: Keywords::new(SUPPORT),
            complaint: Keywords::new(COMPLAINT),
        }
    }

    /// Classify synchronously.
    pub fn evaluate(&self, text: &str, email: &Email) -> LabeledScore<Intent> {
        let text = normalize(text);
        let domain = email.domain();
        let edu_sender = domain == "edu" || domain.ends_with(".edu");

        let spam = self.spam.matches(&text);
        if !spam.is_empty() {
            return scored(Intent::Spam, 0.95, &spam);
        }

        let academic = self.academic.matches(&text);
        if edu_sender {
            return scored(Intent::Academic, 0.85, &academic)
                .with_reasoning(format!("sender domain {domain}; {}", keyword_note(&academic)));
        }
        if !academic.is_empty() {
            return scored(Intent::Academic, 0.75, &academic);
        }

        let internship = self.internship.matches(&text);
        if !internship.is_empty() {
            return scored(Intent::Internship, 0.80, &internship);
        }
        if hr_sender(&email.sender) {
            return scored(Intent::Internship, 0.80, &[]).with_reasoning("HR sender");
        }

        let rules = [
            (Intent::Meeting, 0.75, &self.meeting),
            (Intent::Support, 0.70, &self.support),
            (Intent::Complaint, 0.75, &self.complaint),
        ];
        for (intent, confidence, keywords) in rules {
            let matched = keywords.matches(&text);
            if !matched.is_empty() {
                return scored(intent, confidence, &matched);
            }
        }

        scored(Intent::General, 0.60, &[])
    }
}

impl Default for RuleIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalClassifier<Intent> for RuleIntentClassifier {
    fn model_tag(&self) -> &str {
        MODEL_TAG
    }

    async fn classify(
        &self,
        text: &str,
        metadata: &Email,
    ) -> Result<LabeledScore<Intent>, ClassifierError> {
        let score = self.evaluate(text, metadata);
        debug!(
            id = %metadata.id,
            intent = %score.label,
            confidence = %score.confidence,
            "Intent classified"
        );
        Ok(score)
    }
}

fn scored(intent: Intent, confidence: f32, matched: &[&str]) -> LabeledScore<Intent> {
    LabeledScore::new(intent, Confidence::saturating(confidence)).with_reasoning(keyword_note(matched))
}

fn keyword_note(matched: &[&str]) -> String {
    if matched.is_empty() {
        "no keywords matched".to_string()
    } else {
        format!("matched keywords: {}", matched.join(", "))
    }
}

/// `hr@`, `hr.team@`, `jobs-hr@` and the like.
fn hr_sender(sender: &str) -> bool {
    let local = sender.split('@').next().unwrap_or_default().to_lowercase();
    local
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| part == "hr")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn classify(sender: &str, subject: &str, body: &str) -> LabeledScore<Intent> {
        let email = Email::new("t", sender, "me@x.com", subject, body, Utc::now());
        RuleIntentClassifier::new().evaluate(&email.classification_text(), &email)
    }

    #[test]
    fn edu_sender_is_academic_with_high_confidence() {
        let score = classify(
            "professor@university.edu",
            "Assignment Deadline",
            "The assignment is due next week.",
        );
        assert_eq!(score.label, Intent::Academic);
        assert_eq!(score.confidence.value(), 0.85);
        assert!(score.reasoning.unwrap().contains("assignment"));
    }

    #[test]
    fn academic_keywords_without_edu_sender() {
        let score = classify("ta@gmail.com", "Homework", "Lecture notes attached.");
        assert_eq!(score.label, Intent::Academic);
        assert_eq!(score.confidence.value(), 0.75);
    }

    #[test]
    fn spam_outranks_everything() {
        let score = classify(
            "marketing@shop.edu",
            "50% Discount - Limited Offer!",
            "Click here to claim your discount. Unsubscribe anytime.",
        );
        assert_eq!(score.label, Intent::Spam);
        assert_eq!(score.confidence.value(), 0.95);
    }

    #[test]
    fn hr_sender_is_internship() {
        let score = classify("hr@company.com", "Hello", "We would like to talk to you.");
        assert_eq!(score.label, Intent::Internship);
        let score = classify("hr@company.com", "Interview Invitation", "Please reply.");
        assert_eq!(score.label, Intent::Internship);
    }

    #[test]
    fn hr_only_matches_whole_token() {
        assert!(hr_sender("hr.team@corp.com"));
        assert!(!hr_sender("christopher@corp.com"));
    }

    #[test]
    fn meeting_support_complaint_and_general() {
        assert_eq!(
            classify("c@work.com", "Quick sync", "Are you available tomorrow?").label,
            Intent::Meeting
        );
        assert_eq!(
            classify("u@site.com", "Login", "The page is not working for me").label,
            Intent::Support
        );
        let complaint = classify("u@site.com", "Order", "This is the worst, I want a refund");
        assert_eq!(complaint.label, Intent::Complaint);
        assert_eq!(complaint.confidence.value(), 0.75);
        let general = classify("u@site.com", "Hello", "Just saying hello.");
        assert_eq!(general.label, Intent::General);
        assert_eq!(general.confidence.value(), 0.60);
    }

    #[test]
    fn substring_does_not_trigger_spam() {
        // "free" inside "freedom" is not a spam keyword
        let score = classify("a@b.com", "Essay", "On freedom and the course reading");
        assert_eq!(score.label, Intent::Academic);
    }
}
