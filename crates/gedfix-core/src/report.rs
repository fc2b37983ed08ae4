//! Report generator.
//!
//! Stages emit two kinds of entries through a [`StageReport`] handle:
//!
//! | Entry      | Meaning                                         |
//! |------------|-------------------------------------------------|
//! | [`Change`] | the tree was modified (before / after values)   |
//! | [`Issue`]  | an advisory finding; the tree is left untouched |
//!
//! [`ReportBuilder::finish`] freezes the entries into a [`Report`], which
//! adds a summary keyed `"<stage>.<rule>"` plus `issues` / `changes` totals.
//! The report is identical for dry and real runs; only `dry_run` differs.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub stage: String,
    pub rule: String,
    pub record_id: Option<String>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub stage: String,
    pub rule: String,
    pub record_id: Option<String>,
    pub tag: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// The complete, serializable outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub document_id: String,
    pub profile_name: String,
    pub dry_run: bool,
    pub issues: Vec<Issue>,
    pub changes: Vec<Change>,
    pub summary: BTreeMap<String, usize>,
}

impl Report {
    pub fn count(&self, stage: &str, rule: &str) -> usize {
        self.summary
            .get(&format!("{}.{}", stage, rule))
            .copied()
            .unwrap_or(0)
    }

    pub fn issues_for<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.rule == rule)
    }

    pub fn changes_for<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Change> + 'a {
        self.changes.iter().filter(move |c| c.rule == rule)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(out, "gedfix report{}", mode);
        let _ = writeln!(out, "  document: {}", self.document_id);
        let _ = writeln!(out, "  profile:  {}", self.profile_name);
        let _ = writeln!(out, "  changes:  {}", self.changes.len());
        let _ = writeln!(out, "  issues:   {}", self.issues.len());

        let rules: Vec<(&String, &usize)> = self
            .summary
            .iter()
            .filter(|(k, _)| k.contains('.'))
            .collect();
        if !rules.is_empty() {
            let width = rules.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            let _ = writeln!(out, "\nSummary:");
            for (key, count) in rules {
                let _ = writeln!(out, "  {:<width$}  {}", key, count, width = width);
            }
        }

        if !self.changes.is_empty() {
            let _ = writeln!(out, "\nChanges:");
            for c in &self.changes {
                let _ = writeln!(
                    out,
                    "  [{}.{}] {} {}: {} -> {}",
                    c.stage,
                    c.rule,
                    c.record_id.as_deref().unwrap_or("-"),
                    c.tag,
                    quoted(c.before.as_deref()),
                    quoted(c.after.as_deref()),
                );
            }
        }

        if !self.issues.is_empty() {
            let _ = writeln!(out, "\nIssues:");
            for i in &self.issues {
                let _ = writeln!(
                    out,
                    "  {:<7} [{}.{}] {}: {}",
                    i.severity.as_str(),
                    i.stage,
                    i.rule,
                    i.record_id.as_deref().unwrap_or("-"),
                    i.message,
                );
            }
        }
        out
    }
}

fn quoted(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("\"{}\"", v),
        None => "(none)".to_string(),
    }
}

/// `sha256:<hex>` of the input text.
pub fn document_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Accumulates entries while the stages run.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    issues: Vec<Issue>,
    changes: Vec<Change>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry handle for one stage.
    pub fn stage<'a>(&'a mut self, stage: &'a str) -> StageReport<'a> {
        StageReport {
            builder: self,
            stage,
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn finish(self, document_id: String, profile_name: &str, dry_run: bool) -> Report {
        let mut summary = BTreeMap::new();
        for i in &self.issues {
            *summary.entry(format!("{}.{}", i.stage, i.rule)).or_insert(0) += 1;
        }
        for c in &self.changes {
            *summary.entry(format!("{}.{}", c.stage, c.rule)).or_insert(0) += 1;
        }
        summary.insert("issues".to_string(), self.issues.len());
        summary.insert("changes".to_string(), self.changes.len());

        Report {
            document_id,
            profile_name: profile_name.to_string(),
            dry_run,
            issues: self.issues,
            changes: self.changes,
            summary,
        }
    }
}

/// Borrowed view of a [`ReportBuilder`] that stamps entries with a stage name.
pub struct StageReport<'a> {
    builder: &'a mut ReportBuilder,
    stage: &'a str,
}

impl StageReport<'_> {
    pub fn issue(
        &mut self,
        rule: &str,
        record_id: Option<&str>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.builder.issues.push(Issue {
            stage: self.stage.to_string(),
            rule: rule.to_string(),
            record_id: record_id.map(str::to_string),
            message: message.into(),
            severity,
        });
    }

    pub fn change(
        &mut self,
        rule: &str,
        record_id: Option<&str>,
        tag: &str,
        before: Option<String>,
        after: Option<String>,
    ) {
        self.builder.changes.push(Change {
            stage: self.stage.to_string(),
            rule: rule.to_string(),
            record_id: record_id.map(str::to_string),
            tag: tag.to_string(),
            before,
            after,
        });
    }
}
