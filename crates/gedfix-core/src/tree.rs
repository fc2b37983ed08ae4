//! Tree builder and serializer.
//!
//! Rebuilds the record forest from flat depth-tagged lines by carrying an
//! ancestor stack keyed by depth, and writes it back depth-first.
//!
//! # Fidelity
//!
//! Every parsed [`Record`] keeps its original line text and terminator. A
//! record is re-rendered from its fields only after a rule modified it
//! ([`Record::set_value`]) or when it was created by a rule, so any subtree
//! no rule touched serializes byte-for-byte as it was read. Blank lines are
//! kept verbatim and travel with the record they follow.

use std::collections::HashMap;

use crate::error::{ParseError, ParseErrorReason};
use crate::line::{render_line, tokenize_line, TokenizedLine};

/// A source line kept verbatim (blank lines).
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawLine {
    text: String,
    eol: String,
}

/// One node of the record tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    depth: usize,
    xref: Option<String>,
    tag: String,
    value: String,
    children: Vec<Record>,
    line_index: Option<usize>,
    indent: String,
    /// Original line text; `None` once modified or for inserted records.
    source_text: Option<String>,
    /// Original terminator; `None` means "use the document's line ending".
    eol: Option<String>,
    trailing: Vec<RawLine>,
}

impl Record {
    /// Create a record that did not come from the source text.
    pub fn new(depth: usize, tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            depth,
            xref: None,
            tag: tag.into(),
            value: value.into(),
            children: Vec::new(),
            line_index: None,
            indent: String::new(),
            source_text: None,
            eol: None,
            trailing: Vec::new(),
        }
    }

    pub fn with_xref(mut self, xref: impl Into<String>) -> Self {
        self.xref = Some(xref.into());
        self
    }

    /// A new record placed next to `sibling`, sharing its depth and indentation.
    pub fn sibling_of(sibling: &Record, tag: impl Into<String>, value: impl Into<String>) -> Self {
        let mut record = Self::new(sibling.depth, tag, value);
        record.indent = sibling.indent.clone();
        record
    }

    fn from_token(token: &TokenizedLine<'_>, text: &str, eol: &str) -> Self {
        Self {
            depth: token.depth,
            xref: token.xref.map(str::to_string),
            tag: token.tag.to_string(),
            value: token.value.to_string(),
            children: Vec::new(),
            line_index: Some(token.line_number - 1),
            indent: token.indent.to_string(),
            source_text: Some(text.to_string()),
            eol: Some(eol.to_string()),
            trailing: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn xref(&self) -> Option<&str> {
        self.xref.as_deref()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn children(&self) -> &[Record] {
        &self.children
    }

    /// 0-based source line, `None` for records inserted by a rule.
    pub fn line_index(&self) -> Option<usize> {
        self.line_index
    }

    /// True when this line will be re-rendered instead of copied.
    pub fn is_modified(&self) -> bool {
        self.source_text.is_none()
    }

    /// Replace the value. A no-op when the value is unchanged.
    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value != self.value {
            self.value = value;
            self.source_text = None;
        }
    }

    pub fn child(&self, tag: &str) -> Option<&Record> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn has_child(&self, tag: &str) -> bool {
        self.children.iter().any(|c| c.tag == tag)
    }

    pub fn children_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Record> {
        &mut self.children
    }

    /// Insert a child, re-depthing it to sit directly below this record.
    pub fn insert_child(&mut self, index: usize, mut child: Record) {
        child.set_depth(self.depth + 1);
        self.children.insert(index, child);
    }

    pub fn push_child(&mut self, child: Record) {
        let index = self.children.len();
        self.insert_child(index, child);
    }

    pub fn remove_child(&mut self, index: usize) -> Record {
        self.children.remove(index)
    }

    fn set_depth(&mut self, depth: usize) {
        if self.depth != depth {
            self.depth = depth;
            self.source_text = None;
        }
        for child in &mut self.children {
            child.set_depth(depth + 1);
        }
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    /// Pre-order traversal including `self`.
    pub fn walk<'a, F: FnMut(&'a Record)>(&'a self, f: &mut F) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn walk_mut<F: FnMut(&mut Record)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// One-line human summary of the subtree, e.g. `BIRT: DATE 1850; PLAC Boston`.
    pub fn summary(&self) -> String {
        let mut out = self.tag.clone();
        if !self.value.trim().is_empty() {
            out.push(' ');
            out.push_str(self.value.trim());
        }
        let parts: Vec<String> = self
            .children
            .iter()
            .map(|c| {
                let v = c.value.trim();
                if v.is_empty() {
                    c.tag.clone()
                } else {
                    format!("{} {}", c.tag, v)
                }
            })
            .collect();
        if !parts.is_empty() {
            out.push_str(": ");
            out.push_str(&parts.join("; "));
        }
        out
    }

    /// Structural signature: tags, whitespace-collapsed values and shape.
    ///
    /// Two subtrees with equal signatures carry the same information.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.walk(&mut |r| {
            out.push_str(&(r.depth - self.depth).to_string());
            out.push(' ');
            out.push_str(&r.tag);
            out.push(' ');
            out.push_str(&r.value.split_whitespace().collect::<Vec<_>>().join(" "));
            out.push('\n');
        });
        out
    }

    fn render(&self) -> String {
        match &self.source_text {
            Some(text) => text.clone(),
            None => render_line(
                &self.indent,
                self.depth,
                self.xref.as_deref(),
                &self.tag,
                &self.value,
            ),
        }
    }

    fn write_to(&self, writer: &mut LineWriter<'_>) {
        writer.push(&self.render(), self.eol.as_deref());
        for raw in &self.trailing {
            writer.push(&raw.text, Some(&raw.eol));
        }
        for child in &self.children {
            child.write_to(writer);
        }
    }
}

/// Accumulates output lines, repairing a missing terminator when more
/// lines follow the original last line.
struct LineWriter<'a> {
    out: String,
    default_eol: &'a str,
    missing_eol: bool,
}

impl<'a> LineWriter<'a> {
    fn new(default_eol: &'a str) -> Self {
        Self {
            out: String::new(),
            default_eol,
            missing_eol: false,
        }
    }

    fn push(&mut self, text: &str, eol: Option<&str>) {
        if self.missing_eol {
            self.out.push_str(self.default_eol);
        }
        self.out.push_str(text);
        let eol = eol.unwrap_or(self.default_eol);
        self.out.push_str(eol);
        self.missing_eol = eol.is_empty();
    }
}

/// An ordered forest of top-level records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    preamble: Vec<RawLine>,
    records: Vec<Record>,
    line_ending: String,
}

impl Document {
    /// Build the tree. Fails on the first malformed line; no partial tree
    /// is ever returned.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut preamble = Vec::new();
        let mut roots: Vec<Record> = Vec::new();
        let mut stack: Vec<Record> = Vec::new();
        let mut line_ending: Option<String> = None;

        for (idx, piece) in text.split_inclusive('\n').enumerate() {
            let (content, eol) = split_eol(piece);
            if line_ending.is_none() && !eol.is_empty() {
                line_ending = Some(eol.to_string());
            }

            let Some(token) = tokenize_line(content, idx + 1)? else {
                let raw = RawLine {
                    text: content.to_string(),
                    eol: eol.to_string(),
                };
                match stack.last_mut() {
                    Some(current) => current.trailing.push(raw),
                    None => preamble.push(raw),
                }
                continue;
            };

            if token.depth > stack.len() {
                return Err(ParseError::new(
                    token.line_number,
                    ParseErrorReason::DepthJump {
                        found: token.depth,
                        max_allowed: stack.len(),
                    },
                ));
            }
            while stack.len() > token.depth {
                close_top(&mut stack, &mut roots);
            }
            stack.push(Record::from_token(&token, content, eol));
        }
        while !stack.is_empty() {
            close_top(&mut stack, &mut roots);
        }

        Ok(Self {
            preamble,
            records: roots,
            line_ending: line_ending.unwrap_or_else(|| "\n".to_string()),
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// The line terminator used for re-rendered and inserted lines.
    pub fn line_ending(&self) -> &str {
        &self.line_ending
    }

    /// First top-level record carrying `xref`.
    pub fn find(&self, xref: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.xref() == Some(xref))
    }

    /// Reverse index: identifier → position of its (first) top-level record.
    pub fn identifier_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::new();
        for (pos, record) in self.records.iter().enumerate() {
            if let Some(xref) = record.xref() {
                index.entry(xref).or_insert(pos);
            }
        }
        index
    }

    /// Visit every node as `(owning top-level record, node)`.
    pub fn walk<'a, F: FnMut(&'a Record, &'a Record)>(&'a self, mut f: F) {
        for top in &self.records {
            top.walk(&mut |node| f(top, node));
        }
    }

    /// Mutable visit; the first argument is the owning top-level identifier.
    pub fn walk_mut<F: FnMut(Option<&str>, &mut Record)>(&mut self, mut f: F) {
        for top in &mut self.records {
            let owner = top.xref.clone();
            top.walk_mut(&mut |node| f(owner.as_deref(), node));
        }
    }

    /// Remove the first top-level record with `xref`.
    pub fn remove_record(&mut self, xref: &str) -> Option<Record> {
        let pos = self.records.iter().position(|r| r.xref() == Some(xref))?;
        Some(self.records.remove(pos))
    }

    /// Serialize depth-first.
    pub fn to_text(&self) -> String {
        let mut writer = LineWriter::new(&self.line_ending);
        for raw in &self.preamble {
            writer.push(&raw.text, Some(&raw.eol));
        }
        for record in &self.records {
            record.write_to(&mut writer);
        }
        writer.out
    }
}

fn close_top(stack: &mut Vec<Record>, roots: &mut Vec<Record>) {
    if let Some(record) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(record),
            None => roots.push(record),
        }
    }
}

fn split_eol(piece: &str) -> (&str, &str) {
    if let Some(content) = piece.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = piece.strip_suffix('\n') {
        (content, "\n")
    } else {
        (piece, "")
    }
}
