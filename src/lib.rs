//! Mail Triage: decision pipeline for inbound email.
//!
//! Classifies an email on three signals, gates on the weakest confidence,
//! drafts a reply with the cheapest adequate strategy, validates the draft,
//! and resolves exactly one action: auto-send, draft for review, escalate,
//! or ignore. Collaborator failures always end in escalation.

pub mod classifiers;
pub mod config;
pub mod error;
pub mod generation;
pub mod llm;
pub mod pipeline;
pub mod safety;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::processor::{EmailProcessor, SignalProviders};
pub use pipeline::types::{Action, Decision, DecisionReason, Email, ProcessedEmail};
