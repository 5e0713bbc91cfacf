//! Flattening of note Markdown into plain text items

use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;

static LOCAL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[(\d+)\]").expect("valid marker pattern"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Flatten Markdown to one line of plain text.
pub fn flatten(text: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(text) {
        match event {
            Event::Text(t) | Event::Code(t) | Event::InlineHtml(t) | Event::Html(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Item | TagEnd::Heading(_)) => out.push(' '),
            _ => {}
        }
    }
    collapse_whitespace(&out)
}

/// Split Markdown into items: each list item and each top-level paragraph or
/// heading becomes one plain-text entry. Nested list items are separate entries.
pub fn blocks(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut buffer = String::new();
    let mut item_depth = 0usize;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Item) => {
                flush(&mut buffer, &mut items);
                item_depth += 1;
            }
            Event::End(TagEnd::Item) => {
                flush(&mut buffer, &mut items);
                item_depth = item_depth.saturating_sub(1);
            }
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_)) => {
                if item_depth == 0 {
                    flush(&mut buffer, &mut items);
                } else {
                    buffer.push(' ');
                }
            }
            Event::Text(t) | Event::Code(t) | Event::InlineHtml(t) => buffer.push_str(&t),
            Event::SoftBreak | Event::HardBreak => buffer.push(' '),
            _ => {}
        }
    }
    flush(&mut buffer, &mut items);
    items
}

/// Remove note-local `[n]` markers from text, returning the cleaned text and
/// the marker numbers in order of appearance.
pub fn take_local_markers(text: &str) -> (String, Vec<u32>) {
    let markers = LOCAL_MARKER
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .collect();
    let cleaned = LOCAL_MARKER.replace_all(text, "");
    (collapse_whitespace(&cleaned), markers)
}

fn flush(buffer: &mut String, items: &mut Vec<String>) {
    let text = collapse_whitespace(buffer);
    if !text.is_empty() {
        items.push(text);
    }
    buffer.clear();
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}
