//! Person deduplication.
//!
//! # Algorithm
//!
//! 1. Summarize every `INDI` that has a name: folded name key, birth year
//!    (first 3–4 digit token of the `DATE` of the most complete `BIRT`), sex.
//! 2. Score every unordered pair:
//!    `min(cap, levenshtein% + year term + sex term)`. Pairs below the review
//!    threshold are dropped; the rest are ordered by score, then position.
//! 3. Pairs at or above the auto-merge threshold are merged; pairs touching
//!    a record already merged away are skipped. Merging can make new pairs
//!    similar, so steps 1–3 repeat until a round merges nothing. The pairs
//!    of that last round that fall between the thresholds are reported as
//!    `merge_candidate`.
//!
//! A merge runs on a copy of the document and is committed only once no
//! reference to the removed identifier is left.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::MergeConsistencyError;
use crate::facts::fact_score;
use crate::line::reference_target;
use crate::profile::{Profile, SimilarityWeights};
use crate::report::{ReportBuilder, Severity};
use crate::tree::{Document, Record};

pub const STAGE: &str = "persons";

/// Comparison view of one person record.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSummary {
    pub xref: String,
    pub position: usize,
    pub name_key: String,
    pub birth_year: Option<i32>,
    pub sex: Option<char>,
}

impl PersonSummary {
    /// `None` for records without an identifier or a non-empty `NAME`.
    pub fn from_record(record: &Record, position: usize, profile: &Profile) -> Option<Self> {
        let xref = record.xref()?;
        let name_key = name_key(record.child("NAME")?.value());
        if name_key.is_empty() {
            return None;
        }
        Some(Self {
            xref: xref.to_string(),
            position,
            name_key,
            birth_year: birth_year(record, profile),
            sex: sex(record),
        })
    }
}

/// Display name folded for comparison: no surname slashes, no diacritics,
/// lowercase, single spaces.
pub fn name_key(name: &str) -> String {
    name.replace('/', " ")
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read from the `BIRT` fact deduplication would keep, so the year does not
/// shift when the other births are dropped.
fn birth_year(record: &Record, profile: &Profile) -> Option<i32> {
    let mut best: Option<(&Record, u32)> = None;
    for birth in record.children_with_tag("BIRT") {
        let score = fact_score(birth, profile);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((birth, score));
        }
    }
    let date = best?.0.child("DATE")?;
    date.value()
        .split(|c: char| !c.is_ascii_digit())
        .find(|t| (3..=4).contains(&t.len()))
        .and_then(|t| t.parse().ok())
}

fn sex(record: &Record) -> Option<char> {
    match record.child("SEX")?.value().trim().to_uppercase().as_str() {
        "M" => Some('M'),
        "F" => Some('F'),
        _ => None,
    }
}

/// Normalized Levenshtein similarity scaled to [0, 100].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

pub fn similarity(a: &PersonSummary, b: &PersonSummary, weights: &SimilarityWeights) -> f64 {
    let mut score = name_similarity(&a.name_key, &b.name_key);
    if let (Some(x), Some(y)) = (a.birth_year, b.birth_year) {
        let diff = x.abs_diff(y);
        if diff == 0 {
            score += weights.same_birth_year;
        } else if diff <= weights.near_year_window {
            score += weights.near_birth_year;
        } else if diff > weights.far_year_window {
            score += weights.far_birth_year;
        }
    }
    if let (Some(x), Some(y)) = (a.sex, b.sex) {
        score += if x == y {
            weights.same_sex
        } else {
            weights.different_sex
        };
    }
    score.min(weights.cap)
}

/// A scored pair, `a` before `b` in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub a: String,
    pub b: String,
    pub score: f64,
    positions: (usize, usize),
}

/// Every pair scoring at least the review threshold, best first.
pub fn find_candidates(doc: &Document, profile: &Profile) -> Vec<Candidate> {
    let people: Vec<PersonSummary> = doc
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.tag() == "INDI")
        .filter_map(|(i, r)| PersonSummary::from_record(r, i, profile))
        .collect();

    let mut candidates = Vec::new();
    for (i, a) in people.iter().enumerate() {
        for b in &people[i + 1..] {
            if a.xref == b.xref {
                continue;
            }
            let score = similarity(a, b, &profile.similarity);
            if score >= profile.review_threshold {
                candidates.push(Candidate {
                    a: a.xref.clone(),
                    b: b.xref.clone(),
                    score,
                    positions: (a.position, b.position),
                });
            }
        }
    }
    candidates.sort_by(|x, y| y.score.total_cmp(&x.score).then(x.positions.cmp(&y.positions)));
    candidates
}

/// Natural ordering for identifiers: digit runs compare numerically, so
/// `@I2@` sorts before `@I10@`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut x = a.chars().peekable();
    let mut y = b.chars().peekable();
    loop {
        match (x.peek().copied(), y.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c), Some(d)) if c.is_ascii_digit() && d.is_ascii_digit() => {
                let m = take_digits(&mut x);
                let n = take_digits(&mut y);
                let ord = m
                    .trim_start_matches('0')
                    .len()
                    .cmp(&n.trim_start_matches('0').len())
                    .then_with(|| m.trim_start_matches('0').cmp(n.trim_start_matches('0')))
                    .then_with(|| m.len().cmp(&n.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(c), Some(d)) => {
                if c != d {
                    return c.cmp(&d);
                }
                x.next();
                y.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied().filter(char::is_ascii_digit) {
        out.push(c);
        it.next();
    }
    out
}

/// `(primary, secondary)`: more descendants wins, then the lower identifier.
pub fn choose_primary<'a>(doc: &Document, a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    let size = |x: &str| doc.find(x).map(Record::descendant_count).unwrap_or(0);
    match size(a).cmp(&size(b)) {
        Ordering::Greater => (a, b),
        Ordering::Less => (b, a),
        Ordering::Equal => match natural_cmp(a, b) {
            Ordering::Greater => (b, a),
            _ => (a, b),
        },
    }
}

fn count_references(doc: &Document, target: &str) -> usize {
    let mut count = doc.records().iter().filter(|r| r.xref() == Some(target)).count();
    doc.walk(|_, node| {
        if reference_target(node.value()) == Some(target) {
            count += 1;
        }
    });
    count
}

/// Merge `secondary` into `primary`, returning the merged copy.
///
/// `doc` itself is never modified.
pub fn merge(
    doc: &Document,
    primary: &str,
    secondary: &str,
    score: f64,
    note_prefix: &str,
) -> Result<Document, MergeConsistencyError> {
    let inconsistent = |remaining| MergeConsistencyError {
        primary: primary.to_string(),
        secondary: secondary.to_string(),
        remaining,
    };

    let mut work = doc.clone();
    let removed = work.remove_record(secondary).ok_or_else(|| inconsistent(0))?;
    let target = work
        .records_mut()
        .iter_mut()
        .find(|r| r.xref() == Some(primary))
        .ok_or_else(|| inconsistent(0))?;
    for child in removed.children() {
        target.push_child(child.clone());
    }
    let note = format!(
        "{} Merged duplicate record {} (similarity {:.1})",
        note_prefix, secondary, score
    );
    target.push_child(Record::new(1, "NOTE", note));

    work.walk_mut(|_, node| {
        if reference_target(node.value()) == Some(secondary) {
            let rewritten = node.value().replacen(secondary, primary, 1);
            node.set_value(rewritten);
        }
    });

    match count_references(&work, secondary) {
        0 => Ok(work),
        remaining => Err(inconsistent(remaining)),
    }
}

pub fn dedupe_persons(
    doc: &mut Document,
    profile: &Profile,
    report: &mut ReportBuilder,
) -> Result<(), MergeConsistencyError> {
    let mut stage = report.stage(STAGE);
    let mut failed: HashSet<(String, String)> = HashSet::new();
    let mut round = 0;
    loop {
        round += 1;
        let candidates = find_candidates(doc, profile);
        debug!(round, candidates = candidates.len(), "persons: candidate pairs above review threshold");

        let mut merged_away: HashSet<String> = HashSet::new();
        let mut review = Vec::new();
        for cand in candidates {
            if merged_away.contains(&cand.a) || merged_away.contains(&cand.b) {
                continue;
            }
            if cand.score < profile.auto_merge_threshold {
                review.push(cand);
                continue;
            }

            let (primary, secondary) = choose_primary(doc, &cand.a, &cand.b);
            let pair = (primary.to_string(), secondary.to_string());
            if failed.contains(&pair) {
                continue;
            }
            match merge(doc, primary, secondary, cand.score, &profile.note_prefix) {
                Ok(merged) => {
                    stage.change(
                        "person_merge",
                        Some(primary),
                        "INDI",
                        Some(secondary.to_string()),
                        Some(primary.to_string()),
                    );
                    merged_away.insert(pair.1);
                    *doc = merged;
                }
                Err(err) if profile.strict => return Err(err),
                Err(err) => {
                    warn!(%err, "persons: merge rolled back");
                    stage.issue("merge_failed", Some(primary), Severity::Error, err.to_string());
                    failed.insert(pair);
                }
            }
        }

        if merged_away.is_empty() {
            for cand in review {
                stage.issue(
                    "merge_candidate",
                    Some(&cand.a),
                    Severity::Info,
                    format!(
                        "{} and {} may be the same person (similarity {:.1})",
                        cand.a, cand.b, cand.score
                    ),
                );
            }
            return Ok(());
        }
    }
}
