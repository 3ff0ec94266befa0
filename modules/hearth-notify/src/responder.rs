//! Inbound reply classification against a fixed response vocabulary.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Approved,
    Rejected,
    Unclear,
}

static APPROVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(yes|yep|yeah|approve[d]?|book( it)?|register|sign\s*up|ok(ay)?|sure|go ahead)\b")
        .unwrap()
});

static REJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(no|nope|skip|pass|reject(ed)?|cancel|not interested|don'?t)\b").unwrap()
});

/// Classify raw reply text. Anything matching both vocabularies, or
/// neither, is unclear and left for a human.
pub fn classify_response(raw: &str) -> ResponseClass {
    let approve = APPROVE_RE.is_match(raw);
    let reject = REJECT_RE.is_match(raw);
    match (approve, reject) {
        (true, false) => ResponseClass::Approved,
        (false, true) => ResponseClass::Rejected,
        _ => ResponseClass::Unclear,
    }
}
