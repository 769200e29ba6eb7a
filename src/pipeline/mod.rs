//! Classification-to-decision pipeline.
//!
//! Every email flows strictly forward:
//! 1. `SignalClassifier`s: intent, urgency, sentiment (concurrent)
//! 2. `gate::admit()`: weakest-link confidence against per-intent thresholds
//! 3. `strategy::select()`: template, RAG, or LLM
//! 4. `Generator::generate()`: exactly one call, no retries
//! 5. `ValidationChain`: confidence, length, safety (short-circuiting)
//! 6. `decision::decide()`: the transition table
//!
//! **AUTO_SEND requires a valid draft and an explicit opt-in.** Any failure
//! along the way degrades to ESCALATE, never to IGNORE or an unreviewed send.

pub mod audit;
pub mod decision;
pub mod email_processor;
pub mod gate;
pub mod processor;
pub mod strategy;
pub mod traits;
pub mod types;
pub mod validation;
