//! Plain-text cleanup that leaves `$$...$$` math spans untouched
//!
//! Markdown punctuation, invisible format characters (Unicode `Cf`, which
//! covers zero-width joiners, direction marks and soft hyphens) and control
//! characters are dropped and whitespace is collapsed, but only outside math spans. Spans are
//! located first, the text between them is cleaned piece by piece, and the
//! spans are put back verbatim at their original positions.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Shortest text between two `$$` markers, across line breaks
static MATH_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$.*?\$\$").expect("math span pattern is valid"));

/// Invisible format characters
static FORMAT_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Cf}+").expect("format char pattern is valid"));

const MARKDOWN_CHARS: [char; 4] = ['*', '`', '#', '~'];

/// Byte ranges of every math span in `text`, left to right, non-overlapping.
pub fn math_span_ranges(text: &str) -> Vec<Range<usize>> {
    MATH_SPAN_RE.find_iter(text).map(|m| m.range()).collect()
}

/// Every math span in `text`, delimiters included.
pub fn math_spans(text: &str) -> Vec<&str> {
    MATH_SPAN_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Reduce model output to single-line plain text, preserving math spans.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    let mut cursor = 0;

    for span in math_span_ranges(text) {
        clean_into(&text[cursor..span.start], &mut out, &mut last_space);
        out.push_str(&text[span.clone()]);
        last_space = false;
        cursor = span.end;
    }
    clean_into(&text[cursor..], &mut out, &mut last_space);

    out.trim().to_string()
}

fn clean_into(segment: &str, out: &mut String, last_space: &mut bool) {
    let segment = FORMAT_CHAR_RE.replace_all(segment, "");
    for c in segment.chars() {
        if MARKDOWN_CHARS.contains(&c) {
            continue;
        }
        if c.is_whitespace() {
            if !*last_space {
                out.push(' ');
                *last_space = true;
            }
            continue;
        }
        if c.is_control() {
            continue;
        }
        out.push(c);
        *last_space = false;
    }
}
