//! In-memory knowledge base with keyword-overlap retrieval.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::KnowledgeBaseError;
use crate::pipeline::traits::KnowledgeBase;
use crate::pipeline::types::Snippet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "with", "this", "that", "are", "was", "have", "has",
    "not", "but", "can", "our", "from", "will", "would", "could", "please", "about", "there",
];

/// One knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    /// Free-form labels, typically the intent the entry answers.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Single intent label, accepted alongside `tags`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tags: Vec::new(),
            intent: None,
            source: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Many(Vec<Document>),
    One(Document),
}

struct Indexed {
    document: Document,
    terms: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    entries: Vec<Indexed>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON file (one document or an array), or every `.json` file
    /// in a directory, in file-name order.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KnowledgeBaseError> {
        let path = path.as_ref();
        let mut kb = Self::new();

        let files = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        for file in files {
            let raw = std::fs::read_to_string(&file)?;
            let parsed: DocumentFile = serde_json::from_str(&raw)
                .map_err(|e| KnowledgeBaseError::Load(format!("{}: {e}", file.display())))?;
            match parsed {
                DocumentFile::Many(docs) => docs.into_iter().for_each(|d| kb.add_document(d)),
                DocumentFile::One(doc) => kb.add_document(doc),
            }
        }

        info!(path = %path.display(), documents = kb.len(), "Loaded knowledge base");
        Ok(kb)
    }

    pub fn add_document(&mut self, document: Document) {
        let mut terms = terms_of(&document.content);
        for tag in document.tags.iter().chain(document.intent.iter()) {
            terms.extend(terms_of(tag));
        }
        self.entries.push(Indexed { document, terms });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` documents by the share of query terms they contain.
    /// Documents sharing no term are never returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<Snippet> {
        let query_terms = terms_of(query);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let overlap = query_terms.intersection(&entry.terms).count();
                (overlap > 0).then(|| {
                    (
                        overlap as f32 / query_terms.len() as f32,
                        &entry.document,
                    )
                })
            })
            .collect();
        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(score, doc)| Snippet {
                content: doc.content.clone(),
                score,
                source: doc.source.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Snippet>, KnowledgeBaseError> {
        let snippets = self.search(query, k);
        debug!(k, hits = snippets.len(), "Knowledge base lookup");
        Ok(snippets)
    }
}

fn terms_of(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}
