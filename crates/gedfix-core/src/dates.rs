//! Date normalizer.
//!
//! Every `DATE` value is put into one of six classes:
//!
//! | Class                   | Examples                                      |
//! |-------------------------|-----------------------------------------------|
//! | `exact`                 | `1 JAN 1900`                                  |
//! | `partial`               | `1900`, `JAN 1900`                            |
//! | `qualified`             | `ABT 1900`, `INT 1900 (family bible)`         |
//! | `ranged`                | `BET 1900 AND 1910`, `FROM 1900`, `BEF 1900`  |
//! | `freeform_non_standard` | `1/2/1900`, `1900-01-02`, `January 2, 1900`   |
//! | `unrecognized`          | anything else, including an empty value       |
//!
//! The first four are rewritten by collapsing runs of whitespace and
//! uppercasing month tokens. The value is never reinterpreted. The other
//! two are left alone; a `NOTE` sibling carrying the note prefix is inserted
//! right after the `DATE` node unless one is already there.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::profile::Profile;
use crate::report::{ReportBuilder, Severity, StageReport};
use crate::tree::{Document, Record};

pub const STAGE: &str = "dates";

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const MONTH_NAMES: [&str; 13] = [
    "JANUARY", "FEBRUARY", "MARCH", "APRIL", "MAY", "JUNE", "JULY", "AUGUST", "SEPTEMBER",
    "SEPT", "OCTOBER", "NOVEMBER", "DECEMBER",
];

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}[/.]\d{1,2}[/.]\d{2,4}$").expect("valid regex"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateClass {
    Exact,
    Partial,
    Qualified,
    Ranged,
    FreeformNonStandard,
    Unrecognized,
}

impl DateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Partial => "partial",
            Self::Qualified => "qualified",
            Self::Ranged => "ranged",
            Self::FreeformNonStandard => "freeform_non_standard",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// True for the classes that are safe to rewrite.
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::FreeformNonStandard | Self::Unrecognized)
    }
}

/// Classify a DATE value. Keywords and months match case-insensitively.
pub fn classify(value: &str) -> DateClass {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DateClass::Unrecognized;
    }
    let upper = trimmed.to_uppercase();
    let tokens: Vec<&str> = upper.split_whitespace().collect();

    if let Some(class) = simple_date(&tokens) {
        return class;
    }
    if is_qualified(&upper, &tokens) {
        return DateClass::Qualified;
    }
    if is_ranged(&tokens) {
        return DateClass::Ranged;
    }
    if is_freeform(trimmed, &tokens) {
        return DateClass::FreeformNonStandard;
    }
    DateClass::Unrecognized
}

/// The canonical rendering of a standard-class value, `None` otherwise.
///
/// Only existing whitespace runs collapse and month tokens before an `INT`
/// phrase are uppercased; the phrase keeps its casing.
pub fn normalize(value: &str) -> Option<String> {
    if !classify(value).is_standard() {
        return None;
    }
    let mut in_phrase = false;
    let parts: Vec<String> = value
        .split_whitespace()
        .map(|t| {
            in_phrase |= t.contains('(');
            let upper = t.to_uppercase();
            if !in_phrase && is_month(&upper) {
                upper
            } else {
                t.to_string()
            }
        })
        .collect();
    Some(parts.join(" "))
}

fn is_month(token: &str) -> bool {
    MONTHS.contains(&token)
}

fn is_year(token: &str) -> bool {
    (3..=4).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit())
}

fn is_day(token: &str) -> bool {
    token.len() <= 2
        && token.chars().all(|c| c.is_ascii_digit())
        && matches!(token.parse::<u32>(), Ok(1..=31))
}

fn simple_date(tokens: &[&str]) -> Option<DateClass> {
    match tokens {
        [year] if is_year(year) => Some(DateClass::Partial),
        [month, year] if is_month(month) && is_year(year) => Some(DateClass::Partial),
        [day, month, year] if is_day(day) && is_month(month) && is_year(year) => {
            Some(DateClass::Exact)
        }
        _ => None,
    }
}

fn is_simple(tokens: &[&str]) -> bool {
    simple_date(tokens).is_some()
}

fn is_qualified(upper: &str, tokens: &[&str]) -> bool {
    match tokens.split_first() {
        Some((&("ABT" | "EST" | "CAL"), rest)) => is_simple(rest),
        Some((&"INT", _)) => {
            // INT <date> [(<phrase>)]
            let body = upper.trim_start()["INT".len()..].trim();
            match body.find('(') {
                Some(i) => {
                    let date: Vec<&str> = body[..i].split_whitespace().collect();
                    is_simple(&date) && body.ends_with(')')
                }
                None => is_simple(&tokens[1..]),
            }
        }
        _ => false,
    }
}

fn is_ranged(tokens: &[&str]) -> bool {
    match tokens.split_first() {
        Some((&"BET", rest)) => match rest.iter().position(|t| *t == "AND") {
            Some(i) => is_simple(&rest[..i]) && is_simple(&rest[i + 1..]),
            None => false,
        },
        Some((&"FROM", rest)) => match rest.iter().position(|t| *t == "TO") {
            Some(i) => is_simple(&rest[..i]) && is_simple(&rest[i + 1..]),
            None => is_simple(rest),
        },
        Some((&("TO" | "BEF" | "AFT"), rest)) => is_simple(rest),
        _ => false,
    }
}

fn is_freeform(trimmed: &str, upper_tokens: &[&str]) -> bool {
    if NUMERIC_DATE.is_match(trimmed) || ISO_DATE.is_match(trimmed) {
        return true;
    }
    let has_digit = trimmed.chars().any(|c| c.is_ascii_digit());
    has_digit
        && upper_tokens.iter().any(|t| {
            let word = t.trim_end_matches(['.', ',']);
            MONTH_NAMES.contains(&word)
        })
}

fn annotation_text(prefix: &str, class: DateClass, value: &str) -> String {
    match class {
        DateClass::FreeformNonStandard => {
            format!("{} Non-standard DATE \"{}\" preserved; please verify.", prefix, value)
        }
        _ => format!("{} Unrecognized DATE \"{}\" preserved; please verify.", prefix, value),
    }
}

/// Run the normalizer over the whole document.
pub fn normalize_dates(doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) {
    let prefix = profile.note_prefix.as_str();
    let mut stage = report.stage(STAGE);
    for top in doc.records_mut().iter_mut() {
        let owner = top.xref().map(str::to_string);
        if top.tag() == "DATE" {
            check_date(top, owner.as_deref(), &mut stage);
        }
        visit(top, owner.as_deref(), prefix, &mut stage);
    }
}

fn visit(parent: &mut Record, owner: Option<&str>, prefix: &str, report: &mut StageReport<'_>) {
    let mut i = 0;
    while i < parent.children().len() {
        let children = parent.children_mut();
        if children[i].tag() == "DATE" {
            let class = check_date(&mut children[i], owner, report);
            if !class.is_standard() && !is_annotation(children.get(i + 1), prefix) {
                let text = annotation_text(prefix, class, children[i].value());
                let note = Record::sibling_of(&children[i], "NOTE", text.clone());
                children.insert(i + 1, note);
                report.change("date_annotation", owner, "NOTE", None, Some(text));
            }
        }
        visit(&mut children[i], owner, prefix, report);
        i += 1;
    }
}

/// Classify one DATE node, rewriting it in place when that is safe.
fn check_date(node: &mut Record, owner: Option<&str>, report: &mut StageReport<'_>) -> DateClass {
    let class = classify(node.value());
    if let Some(canonical) = normalize(node.value()) {
        if canonical != node.value() {
            let before = node.value().to_string();
            node.set_value(canonical.clone());
            report.change("date_normalize", owner, "DATE", Some(before), Some(canonical));
        }
        return class;
    }
    let rule = match class {
        DateClass::FreeformNonStandard => "date_non_standard",
        _ => "date_unrecognized",
    };
    report.issue(
        rule,
        owner,
        Severity::Warning,
        format!("DATE \"{}\" is {}; value left unchanged", node.value(), class.as_str()),
    );
    class
}

fn is_annotation(next: Option<&Record>, prefix: &str) -> bool {
    next.is_some_and(|r| r.tag() == "NOTE" && r.value().starts_with(prefix))
}
