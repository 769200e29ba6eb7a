//! Draft cleanup and heuristic quality scoring.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ValidationPolicy;
use crate::pipeline::types::Confidence;

static LEADING_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:reply|response)\s*:\s*").expect("valid regex"));
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

const GREETINGS: &[&str] = &[
    "dear",
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

const SIGN_OFFS: &[&str] = &[
    "best",
    "regards",
    "kind regards",
    "sincerely",
    "thanks",
    "thank you",
    "cheers",
    "warm regards",
];

/// Tidy a raw draft. When `ensure_signature` is set and the signature name
/// is missing, a sign-off block is appended.
pub fn post_process(raw: &str, signature: &str, ensure_signature: bool) -> String {
    let stripped = LEADING_LABEL.replace(raw.trim(), "");
    let lines: Vec<String> = stripped
        .lines()
        .map(|line| SPACE_RUN.replace_all(line.trim_end(), " ").into_owned())
        .collect();
    let mut draft = BLANK_RUN
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string();

    if ensure_signature && !signature.is_empty() && !draft.contains(signature) {
        draft.push_str(&format!("\n\nBest regards,\n{signature}"));
    }

    if !draft.is_empty() && !ends_cleanly(&draft) {
        draft.push('.');
    }
    draft
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Share of five structural checks the draft passes: greeting, sign-off,
/// clean ending, single spacing, and length within the policy's bounds.
pub fn quality_score(draft: &str, policy: &ValidationPolicy) -> Confidence {
    let lines: Vec<&str> = draft
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let greeting = lines.first().is_some_and(|first| starts_with_any(first, GREETINGS));
    let sign_off = lines
        .iter()
        .rev()
        .take(3)
        .any(|line| starts_with_any(line, SIGN_OFFS));
    let words = word_count(draft);

    let checks = [
        greeting,
        sign_off,
        ends_cleanly(draft),
        !draft.contains("  "),
        (policy.min_words..=policy.max_words).contains(&words),
    ];
    let passed = checks.iter().filter(|ok| **ok).count();
    Confidence::saturating(passed as f32 / checks.len() as f32)
}

/// Terminal punctuation, or a short name line under a sign-off.
fn ends_cleanly(draft: &str) -> bool {
    let trimmed = draft.trim_end();
    if trimmed.ends_with(['.', '!', '?']) {
        return true;
    }
    ends_with_signature(trimmed)
}

fn ends_with_signature(draft: &str) -> bool {
    let mut lines = draft.lines().rev().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(name), Some(sign_off)) => {
            word_count(name) <= 4 && sign_off.ends_with(',') && starts_with_any(sign_off, SIGN_OFFS)
        }
        _ => false,
    }
}

fn starts_with_any(line: &str, prefixes: &[&str]) -> bool {
    let lower = line.to_lowercase();
    prefixes.iter().any(|p| {
        lower
            .strip_prefix(p)
            .is_some_and(|rest| rest.is_empty() || !rest.starts_with(char::is_alphanumeric))
    })
}
