//! crates/chain_tutor_core/src/markdown.rs
//!
//! A small markdown subset used for assistant replies.
//!
//! Grammar:
//! - the document is split into blocks on blank lines;
//! - a block starting with `# `, `## ` or `### ` is a heading of level 1..3;
//! - a block whose every line starts with `- ` or `* ` is an unordered list;
//! - a block whose every line matches `<number>. ` is an ordered list;
//! - anything else is a paragraph.
//!
//! Inline spans: `**bold**`, `*italic*` and `[text](url)` links restricted to
//! http/https. Rendering to HTML escapes all text.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("block separator pattern is valid"));
static ORDERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s").expect("ordered item pattern is valid"));
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]+)\]\((https?://[^\s)]+)\)").expect("link pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    Link { text: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, spans: Vec<Inline> },
    UnorderedList { items: Vec<Vec<Inline>> },
    OrderedList { items: Vec<Vec<Inline>> },
    Paragraph { spans: Vec<Inline> },
}

/// Parses raw text into block descriptors. Pure; never fails.
pub fn parse(text: &str) -> Vec<Block> {
    BLOCK_SEPARATOR
        .split(text)
        .filter(|block| !block.trim().is_empty())
        .map(parse_block)
        .collect()
}

fn parse_block(block: &str) -> Block {
    for (prefix, level) in [("### ", 3u8), ("## ", 2), ("# ", 1)] {
        if let Some(rest) = block.strip_prefix(prefix) {
            return Block::Heading {
                level,
                spans: parse_inline(rest),
            };
        }
    }

    let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines
        .iter()
        .all(|l| l.trim().starts_with("- ") || l.trim().starts_with("* "))
    {
        return Block::UnorderedList {
            items: lines
                .iter()
                .map(|l| parse_inline(&l.trim()[2..]))
                .collect(),
        };
    }

    if lines.iter().all(|l| ORDERED_ITEM.is_match(l.trim())) {
        return Block::OrderedList {
            items: lines
                .iter()
                .map(|l| parse_inline(&ORDERED_ITEM.replace(l.trim(), "")))
                .collect(),
        };
    }

    Block::Paragraph {
        spans: parse_inline(block),
    }
}

/// Splits a line into inline spans. Unmatched markers stay literal text.
pub fn parse_inline(line: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut text = String::new();
    let mut rest = line;

    while let Some(ch) = rest.chars().next() {
        if let Some(caps) = LINK.captures(rest) {
            flush(&mut text, &mut spans);
            spans.push(Inline::Link {
                text: caps[1].to_string(),
                url: caps[2].to_string(),
            });
            rest = &rest[caps[0].len()..];
            continue;
        }
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**") {
                flush(&mut text, &mut spans);
                spans.push(Inline::Bold(after[..end].to_string()));
                rest = &after[end + 2..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = after.find('*') {
                if end > 0 {
                    flush(&mut text, &mut spans);
                    spans.push(Inline::Italic(after[..end].to_string()));
                    rest = &after[end + 1..];
                    continue;
                }
            }
        }
        text.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    flush(&mut text, &mut spans);
    spans
}

fn flush(text: &mut String, spans: &mut Vec<Inline>) {
    if !text.is_empty() {
        spans.push(Inline::Text(std::mem::take(text)));
    }
}

//=========================================================================================
// HTML Output
//=========================================================================================

/// Renders blocks as an HTML fragment with every text node escaped.
pub fn to_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Heading { level, spans } => {
                // `#` maps to h2 so replies never compete with the page title.
                let tag = format!("h{}", level + 1);
                out.push_str(&format!("<{tag}>{}</{tag}>", render_spans(spans)));
            }
            Block::UnorderedList { items } => render_list(&mut out, "ul", items),
            Block::OrderedList { items } => render_list(&mut out, "ol", items),
            Block::Paragraph { spans } => {
                out.push_str(&format!("<p>{}</p>", render_spans(spans).replace('\n', "<br>")));
            }
        }
    }
    out
}

/// Convenience for `to_html(&parse(text))`.
pub fn render(text: &str) -> String {
    to_html(&parse(text))
}

fn render_list(out: &mut String, tag: &str, items: &[Vec<Inline>]) {
    out.push_str(&format!("<{tag}>"));
    for item in items {
        out.push_str(&format!("<li>{}</li>", render_spans(item)));
    }
    out.push_str(&format!("</{tag}>"));
}

fn render_spans(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(t) => escape(t),
            Inline::Bold(t) => format!("<strong>{}</strong>", escape(t)),
            Inline::Italic(t) => format!("<em>{}</em>", escape(t)),
            Inline::Link { text, url } => format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                escape(url),
                escape(text)
            ),
        })
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
