//! Fact and link deduplication.
//!
//! ## Fact groups
//!
//! Under each fact owner (`INDI`, `FAM`), facts sharing a tag form a group.
//! Each member gets a Completeness Score:
//!
//! ```text
//! score = existence
//!       + date   (has DATE)   + place (has PLAC)
//!       + source (has SOUR)   + note  (has NOTE)
//!       + deep_descendant × (nodes two or more levels below the fact)
//! ```
//!
//! `NOTE`s the engine inserted itself (value starting with the note prefix)
//! do not count toward `note`. The highest score survives, the first
//! occurrence winning ties.
//!
//! ## Duplicate links
//!
//! Family links (`FAMS`/`FAMC` on persons, `HUSB`/`WIFE`/`CHIL` on families)
//! and person `NAME` subtrees that repeat an earlier sibling exactly, up to
//! whitespace, are removed. These appear mostly after merges.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::profile::{CompletenessWeights, Profile};
use crate::report::ReportBuilder;
use crate::tree::{Document, Record};

pub const STAGE: &str = "facts";
pub const LINK_STAGE: &str = "links";

pub const FACT_OWNERS: [&str; 2] = ["INDI", "FAM"];

pub fn completeness_score(fact: &Record, weights: &CompletenessWeights) -> u32 {
    score(fact, weights, None)
}

/// Completeness Score under `profile`, ignoring its own annotation notes.
pub fn fact_score(fact: &Record, profile: &Profile) -> u32 {
    score(fact, &profile.completeness, Some(&profile.note_prefix))
}

fn score(fact: &Record, weights: &CompletenessWeights, annotation_prefix: Option<&str>) -> u32 {
    let mut score = weights.existence;
    if fact.has_child("DATE") {
        score += weights.date;
    }
    if fact.has_child("PLAC") {
        score += weights.place;
    }
    if fact.has_child("SOUR") {
        score += weights.source;
    }
    let has_note = fact
        .children_with_tag("NOTE")
        .any(|n| annotation_prefix.map_or(true, |p| !n.value().starts_with(p)));
    if has_note {
        score += weights.note;
    }
    let deep: usize = fact.children().iter().map(Record::descendant_count).sum();
    score + weights.deep_descendant * deep as u32
}

/// Indices of the facts to drop from `owner`, in document order.
fn losers(owner: &Record, profile: &Profile) -> Vec<usize> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, child) in owner.children().iter().enumerate() {
        if profile.is_fact_tag(child.tag()) {
            groups.entry(child.tag()).or_default().push(i);
        }
    }
    let mut drop = Vec::new();
    for members in groups.values().filter(|m| m.len() > 1) {
        let mut best = members[0];
        let mut best_score = fact_score(&owner.children()[best], profile);
        for &i in &members[1..] {
            let score = fact_score(&owner.children()[i], profile);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        drop.extend(members.iter().copied().filter(|&i| i != best));
    }
    drop.sort_unstable();
    drop
}

pub fn dedupe_facts(doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) {
    let mut stage = report.stage(STAGE);
    let mut removed = 0;
    for owner in doc.records_mut().iter_mut() {
        if !FACT_OWNERS.contains(&owner.tag()) {
            continue;
        }
        let drop = losers(owner, profile);
        for &i in &drop {
            let fact = &owner.children()[i];
            stage.change(
                "duplicate_fact",
                owner.xref(),
                fact.tag(),
                Some(fact.summary()),
                None,
            );
        }
        for &i in drop.iter().rev() {
            owner.remove_child(i);
            removed += 1;
        }
    }
    debug!(removed, "facts: duplicate facts removed");
}

fn link_tags(owner_tag: &str) -> &'static [&'static str] {
    match owner_tag {
        "INDI" => &["FAMS", "FAMC", "NAME"],
        "FAM" => &["HUSB", "WIFE", "CHIL"],
        _ => &[],
    }
}

pub fn dedupe_links(doc: &mut Document, report: &mut ReportBuilder) {
    let mut stage = report.stage(LINK_STAGE);
    for owner in doc.records_mut().iter_mut() {
        let tags = link_tags(owner.tag());
        if tags.is_empty() {
            continue;
        }
        let mut seen = HashSet::new();
        let mut drop = Vec::new();
        for (i, child) in owner.children().iter().enumerate() {
            if tags.contains(&child.tag()) && !seen.insert(child.signature()) {
                drop.push(i);
            }
        }
        for &i in &drop {
            let child = &owner.children()[i];
            let rule = if child.tag() == "NAME" {
                "duplicate_name"
            } else {
                "duplicate_link"
            };
            stage.change(rule, owner.xref(), child.tag(), Some(child.summary()), None);
        }
        for &i in drop.iter().rev() {
            owner.remove_child(i);
        }
    }
}
