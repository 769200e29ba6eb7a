//! Per-intent reply templates.

use std::fmt::Write as _;

use crate::classifiers::urgency::detect_deadline;
use crate::pipeline::types::{ClassificationResult, Email, Intent, Urgency};

/// Confidence assigned to every templated draft.
pub const TEMPLATE_CONFIDENCE: f32 = 0.85;

pub const TEMPLATE_TAG: &str = "templates/1";

/// Renders fixed replies for the common intents, parameterised by sender
/// name, subject, urgency and any detected deadline.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    signature: String,
}

impl TemplateEngine {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    pub fn render(&self, email: &Email, classification: &ClassificationResult) -> String {
        let name = sender_name(&email.sender);
        let subject = if email.subject.trim().is_empty() {
            "your message"
        } else {
            email.subject.trim()
        };
        let urgency = classification.urgency.label;

        let mut out = String::new();
        match classification.intent.label {
            Intent::Academic => {
                let _ = writeln!(out, "Dear {name},\n");
                let _ = writeln!(out, "Thank you for your email regarding {subject}.\n");
                if urgency.is_pressing() {
                    out.push_str("I have received your message and will respond with the requested information as soon as possible.\n\n");
                } else {
                    out.push_str("I have received your message and will get back to you shortly with the requested information.\n\n");
                }
                if let Some(deadline) = detect_deadline(&email.body, email.received_at) {
                    let _ = writeln!(
                        out,
                        "I have noted the deadline ({}) and will make sure to respond in time.\n",
                        deadline.text
                    );
                }
                self.sign(&mut out, "Best regards,");
            }
            Intent::Internship => {
                let _ = writeln!(out, "Hello {name},\n");
                let _ = writeln!(out, "Thank you for reaching out regarding {subject}.\n");
                let lower = subject.to_lowercase();
                if lower.contains("interview") {
                    out.push_str("I appreciate the opportunity and am very interested in this position. I am available for an interview and will confirm my availability shortly.\n\n");
                } else if lower.contains("application") {
                    out.push_str("Thank you for considering my application. I am very interested in this opportunity and look forward to hearing from you.\n\n");
                } else {
                    out.push_str("I appreciate the opportunity and will respond with the requested information shortly.\n\n");
                }
                self.sign(&mut out, "Kind regards,");
            }
            Intent::Meeting => {
                let _ = writeln!(out, "Hello {name},\n");
                let _ = writeln!(out, "Thank you for your message about {subject}.\n");
                if urgency.is_pressing() {
                    out.push_str("I am available at the proposed time and look forward to our meeting.\n\n");
                } else {
                    out.push_str("I would be happy to meet. Please let me know what times work best for you, and I will confirm my availability.\n\n");
                }
                self.sign(&mut out, "Best,");
            }
            Intent::Support => {
                out.push_str("Hello,\n\n");
                let _ = writeln!(out, "Thank you for reaching out regarding {subject}.\n");
                let when = match urgency {
                    Urgency::Critical => "as soon as possible",
                    Urgency::High => "within 24 hours",
                    Urgency::Medium | Urgency::Low => "within 2-3 business days",
                };
                let _ = writeln!(
                    out,
                    "I have received your request and will look into this matter. I will get back to you {when} with a solution.\n"
                );
                self.sign(&mut out, "Best regards,");
            }
            Intent::Complaint | Intent::Spam | Intent::General => {
                let _ = writeln!(out, "Hello {name},\n");
                let _ = writeln!(out, "Thank you for your email regarding {subject}.\n");
                out.push_str("I have received your message and will respond shortly.\n\n");
                self.sign(&mut out, "Best regards,");
            }
        }
        out
    }

    fn sign(&self, out: &mut String, sign_off: &str) {
        out.push_str(sign_off);
        out.push('\n');
        out.push_str(&self.signature);
    }
}

/// Display name from an address: `john.doe@x.com` becomes `John Doe`.
/// Falls back to "there".
pub fn sender_name(address: &str) -> String {
    let address = match (address.find('<'), address.rfind('>')) {
        (Some(start), Some(end)) if end > start => &address[start + 1..end],
        _ => address,
    };
    let local = address.split('@').next().unwrap_or_default();
    let name = local
        .split(['.', '_', '-', '+'])
        .filter(|part| !part.is_empty() && !part.chars().all(|c| c.is_ascii_digit()))
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        "there".to_string()
    } else {
        name
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
