//! Generation strategy selector.
//!
//! First match wins:
//! 1. templatable intent with confidence at or above the template threshold → Template
//! 2. specialized-domain intent with retrieved knowledge → RAG
//! 3. otherwise → LLM
//!
//! Deterministic: same inputs, same strategy.

use tracing::debug;

use crate::config::StrategyConfig;
use crate::pipeline::gate::GateResult;
use crate::pipeline::types::{ClassificationResult, Strategy};

/// Choose how to generate a draft. Only meaningful for admitted emails.
pub fn select(
    classification: &ClassificationResult,
    gate: &GateResult,
    knowledge_base_available: bool,
    config: &StrategyConfig,
) -> Strategy {
    debug_assert!(gate.admitted, "strategy selection requires gate admission");

    let intent = classification.intent.label;

    let strategy = if template_matches(classification, gate, config) {
        Strategy::Template
    } else if config.rag_intents.contains(&intent) && knowledge_base_available {
        Strategy::Rag
    } else {
        Strategy::Llm
    };

    debug!(
        intent = %intent,
        min_confidence = %gate.min_confidence,
        knowledge_base_available,
        strategy = %strategy,
        "Generation strategy selected"
    );

    strategy
}

/// Whether retrieval is worth attempting: a RAG intent that the template
/// rule will not already claim.
pub fn wants_retrieval(
    classification: &ClassificationResult,
    gate: &GateResult,
    config: &StrategyConfig,
) -> bool {
    config.rag_intents.contains(&classification.intent.label)
        && !template_matches(classification, gate, config)
}

fn template_matches(
    classification: &ClassificationResult,
    gate: &GateResult,
    config: &StrategyConfig,
) -> bool {
    config.template_intents.contains(&classification.intent.label)
        && gate.min_confidence >= config.template_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::pipeline::gate::admit;
    use crate::pipeline::types::{Confidence, Intent, LabeledScore, Sentiment, Urgency};

    fn classify(intent: Intent, confidence: f32) -> (ClassificationResult, GateResult) {
        let c = ClassificationResult::new(
            LabeledScore::new(intent, Confidence::new(confidence).unwrap()),
            LabeledScore::new(Urgency::Low, Confidence::ONE),
            LabeledScore::new(Sentiment::Neutral, Confidence::ONE),
        );
        let mut gate_config = GateConfig::default();
        gate_config.default_threshold = Confidence::ZERO;
        gate_config.intent_thresholds.clear();
        let gate = admit(&c, &gate_config);
        (c, gate)
    }

    #[test]
    fn confident_templatable_intent_uses_template() {
        let (c, gate) = classify(Intent::Academic, 0.9);
        assert_eq!(
            select(&c, &gate, true, &StrategyConfig::default()),
            Strategy::Template
        );
    }

    #[test]
    fn template_threshold_is_inclusive() {
        let (c, gate) = classify(Intent::Meeting, 0.8);
        assert_eq!(
            select(&c, &gate, false, &StrategyConfig::default()),
            Strategy::Template
        );
    }

    #[test]
    fn below_template_threshold_with_knowledge_uses_rag() {
        let (c, gate) = classify(Intent::Support, 0.75);
        assert_eq!(
            select(&c, &gate, true, &StrategyConfig::default()),
            Strategy::Rag
        );
    }

    #[test]
    fn rag_intent_without_knowledge_falls_back_to_llm() {
        let (c, gate) = classify(Intent::Internship, 0.7);
        assert_eq!(
            select(&c, &gate, false, &StrategyConfig::default()),
            Strategy::Llm
        );
    }

    #[test]
    fn non_templatable_non_rag_intent_uses_llm() {
        let (c, gate) = classify(Intent::Complaint, 0.99);
        assert_eq!(
            select(&c, &gate, true, &StrategyConfig::default()),
            Strategy::Llm
        );
    }

    #[test]
    fn template_rule_checked_before_rag_rule() {
        // Academic is in both sets
        let (c, gate) = classify(Intent::Academic, 0.95);
        assert_eq!(
            select(&c, &gate, true, &StrategyConfig::default()),
            Strategy::Template
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let (c, gate) = classify(Intent::Support, 0.7);
        let config = StrategyConfig::default();
        let first = select(&c, &gate, true, &config);
        for _ in 0..10 {
            assert_eq!(select(&c, &gate, true, &config), first);
        }
    }

    #[test]
    fn retrieval_only_for_rag_intents() {
        let config = StrategyConfig::default();
        let (c, gate) = classify(Intent::Support, 0.75);
        assert!(wants_retrieval(&c, &gate, &config));
        let (c, gate) = classify(Intent::Meeting, 0.5);
        assert!(!wants_retrieval(&c, &gate, &config));
    }

    #[test]
    fn no_retrieval_when_template_rule_wins() {
        let config = StrategyConfig::default();
        let (c, gate) = classify(Intent::Academic, 0.95);
        assert!(!wants_retrieval(&c, &gate, &config));
        let (c, gate) = classify(Intent::Academic, 0.6);
        assert!(wants_retrieval(&c, &gate, &config));
    }
}
