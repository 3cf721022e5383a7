//! Model output → Telegram legacy Markdown.
//!
//! Literal substitutions, not a markdown parser.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>").expect("valid think regex")
});

static HEADING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{1,6}\s*").expect("valid heading regex")
});

/// Convert model markup into text Telegram renders with `parse_mode=Markdown`.
///
/// 1. Each `<think>...</think>` span (may cross lines) becomes a fenced block
///    holding the trimmed inner text.
/// 2. `**`, `__` and `~~` collapse to `*`, `_` and `~`.
/// 3. One to six `#` plus the whitespace after them are removed at the start
///    of every line.
pub fn format_for_chat(text: &str) -> String {
    let text = THINK_BLOCK.replace_all(text, |caps: &Captures<'_>| {
        let inner = caps.get(1).map_or("", |m| m.as_str());
        format!("```\n{}```", inner.trim())
    });

    let text = text
        .replace("**", "*")
        .replace("__", "_")
        .replace("~~", "~");

    let text = HEADING_MARKER.replace_all(&text, "").into_owned();
    tracing::trace!(len = text.len(), "Formatted output for chat");
    text
}
