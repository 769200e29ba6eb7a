//! Draft generation: templates, knowledge-base retrieval, and LLM drafting.

pub mod drafter;
pub mod knowledge;
pub mod llm;
pub mod quality;
pub mod template;

pub use drafter::Drafter;
pub use knowledge::{Document, InMemoryKnowledgeBase};
pub use template::TemplateEngine;
