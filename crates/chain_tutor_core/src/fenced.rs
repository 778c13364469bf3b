//! crates/chain_tutor_core/src/fenced.rs
//!
//! Recovers a payload from a model reply that may be wrapped in a markdown
//! fenced code block (three backticks, optional language tag, content, three backticks).

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    // Non-greedy across newlines; the first fenced block wins.
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)\s*```").expect("fence pattern is valid")
});

/// Returns the content of the first fenced block, or the trimmed reply when unfenced.
pub fn extract_payload(reply: &str) -> &str {
    let trimmed = reply.trim();
    match FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}
