//! Line tokenizer.
//!
//! Splits one physical line into `(depth, identifier, tag, value)`:
//!
//! ```text
//! 0 @I1@ INDI
//! │  │    └── tag
//! │  └── identifier (optional, `@…@`)
//! └── depth
//! 1 NAME John /Smith/
//!        └── value: everything after the single delimiter, verbatim
//! ```
//!
//! The tokenizer borrows from the input and never trims the value, so a
//! line that no rule touches can be written back exactly as it was read.

use crate::error::{ParseError, ParseErrorReason};

/// One tokenized, non-blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine<'a> {
    /// 1-based position in the source.
    pub line_number: usize,
    /// Leading whitespace before the depth token.
    pub indent: &'a str,
    pub depth: usize,
    pub xref: Option<&'a str>,
    pub tag: &'a str,
    pub value: &'a str,
}

/// Tokenize a line (without its terminator).
///
/// Returns `Ok(None)` for blank lines, which the tree builder keeps verbatim.
pub fn tokenize_line(text: &str, line_number: usize) -> Result<Option<TokenizedLine<'_>>, ParseError> {
    if text.chars().all(|c| c.is_whitespace() || c == '\u{feff}') {
        return Ok(None);
    }

    let body_start = text
        .char_indices()
        .find(|(_, c)| !(c.is_whitespace() || *c == '\u{feff}'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let indent = &text[..body_start];
    let body = &text[body_start..];

    let (depth_token, rest) = split_token(body);
    let depth = parse_depth(depth_token, line_number)?;

    let rest = rest.trim_start();
    if rest.is_empty() {
        return Err(ParseError::new(line_number, ParseErrorReason::MissingTag));
    }

    let (first, after_first) = split_token(rest);
    let (xref, tag, after_tag) = if is_identifier(first) {
        let after_xref = after_first.trim_start();
        let (tag, after_tag) = split_token(after_xref);
        if tag.is_empty() {
            return Err(ParseError::new(line_number, ParseErrorReason::MissingTag));
        }
        (Some(first), tag, after_tag)
    } else {
        (None, first, after_first)
    };

    // `after_tag` is either empty or starts with the delimiter.
    let value = match after_tag.chars().next() {
        Some(delim) => &after_tag[delim.len_utf8()..],
        None => "",
    };

    Ok(Some(TokenizedLine {
        line_number,
        indent,
        depth,
        xref,
        tag,
        value,
    }))
}

/// True when `token` is a bracketed identifier such as `@I42@`.
pub fn is_identifier(token: &str) -> bool {
    token.len() >= 3
        && token.starts_with('@')
        && token.ends_with('@')
        && !token[1..token.len() - 1]
            .chars()
            .any(|c| c == '@' || c.is_whitespace())
}

/// The identifier a value points at, if the whole (trimmed) value is one.
pub fn reference_target(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    is_identifier(trimmed).then_some(trimmed)
}

/// Render a line in canonical form: `{indent}{depth} [{xref} ]{tag}[ {value}]`.
pub fn render_line(indent: &str, depth: usize, xref: Option<&str>, tag: &str, value: &str) -> String {
    let mut out = String::with_capacity(indent.len() + tag.len() + value.len() + 16);
    out.push_str(indent);
    out.push_str(&depth.to_string());
    out.push(' ');
    if let Some(xref) = xref {
        out.push_str(xref);
        out.push(' ');
    }
    out.push_str(tag);
    if !value.is_empty() {
        out.push(' ');
        out.push_str(value);
    }
    out
}

fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn parse_depth(token: &str, line_number: usize) -> Result<usize, ParseError> {
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ParseError::new(line_number, ParseErrorReason::MissingDepth));
    }
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::new(
            line_number,
            ParseErrorReason::NonNumericDepth(token.to_string()),
        ));
    }
    token.parse::<usize>().map_err(|_| {
        ParseError::new(
            line_number,
            ParseErrorReason::NonNumericDepth(token.to_string()),
        )
    })
}
