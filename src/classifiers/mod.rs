//! Rule-based signal providers.
//!
//! Offline adapters for the `SignalClassifier` capability: keyword and
//! pattern matching, no model weights. Each result carries a reasoning
//! string naming what matched.

pub mod intent;
pub mod sentiment;
pub mod urgency;

use std::sync::Arc;

pub use intent::RuleIntentClassifier;
pub use sentiment::RuleSentimentAnalyzer;
pub use urgency::RuleUrgencyDetector;

use crate::pipeline::processor::SignalProviders;

/// All three rule-based providers, ready for `EmailProcessor::new`.
pub fn rule_based() -> SignalProviders {
    SignalProviders {
        intent: Arc::new(RuleIntentClassifier::new()),
        urgency: Arc::new(RuleUrgencyDetector::new()),
        sentiment: Arc::new(RuleSentimentAnalyzer::new()),
    }
}

/// Lowercased text with punctuation collapsed to single spaces and padded
/// at both ends, so a keyword matches only on word boundaries.
pub(crate) fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// A fixed list of keywords or short phrases.
#[derive(Debug, Clone)]
pub(crate) struct Keywords {
    entries: Vec<(&'static str, String)>,
}

impl Keywords {
    pub(crate) fn new(words: &[&'static str]) -> Self {
        Self {
            entries: words.iter().map(|w| (*w, normalize(w))).collect(),
        }
    }

    /// Keywords found in already-normalized text, in list order.
    pub(crate) fn matches(&self, normalized: &str) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, needle)| normalized.contains(needle.as_str()))
            .map(|(word, _)| *word)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pads_and_collapses() {
        assert_eq!(normalize("Hello,   World!"), " hello world ");
        assert_eq!(normalize("time-sensitive"), " time sensitive ");
        assert_eq!(normalize(""), " ");
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let kw = Keywords::new(&["free", "how to", "office hours"]);
        assert!(kw.matches(&normalize("Freedom of speech")).is_empty());
        assert_eq!(kw.matches(&normalize("It's FREE!")), vec!["free"]);
        assert_eq!(
            kw.matches(&normalize("How to find office-hours?")),
            vec!["how to", "office hours"]
        );
    }
}
