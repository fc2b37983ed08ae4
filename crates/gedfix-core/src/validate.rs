//! Structural validator. Read-only: every finding becomes an issue.
//!
//! | Rule                       | Severity | Finding                                         |
//! |----------------------------|----------|-------------------------------------------------|
//! | `orphan_reference`         | error    | a reference whose target does not exist        |
//! | `duplicate_identifier`     | error    | a second top-level record with the same id     |
//! | `disconnected_person`      | warning  | an `INDI` with no family links in or out       |
//! | `missing_required_child`   | warning  | a schema-required child tag is absent          |
//! | `empty_family`             | warning  | a `FAM` with no `HUSB`, `WIFE` or `CHIL`        |
//! | `siblings_same_first_name` | info     | two children of one family share a given name  |
//! | `suffix_in_name`           | warning  | `GIVN`/`SURN` carries a suffix and no `NSFX`    |

use std::collections::{HashMap, HashSet};

use crate::line::reference_target;
use crate::profile::Profile;
use crate::report::{ReportBuilder, Severity};
use crate::tree::{Document, Record};

pub const STAGE: &str = "validate";

const FAMILY_ROLES: [&str; 3] = ["HUSB", "WIFE", "CHIL"];

const SUFFIXES: [&str; 12] = [
    "JR", "SR", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "ESQ",
];

/// One identifier-shaped value found anywhere in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub owner: Option<&'a str>,
    pub tag: &'a str,
    pub target: &'a str,
}

/// Identifier → top-level record, plus every reference in document order.
#[derive(Debug)]
pub struct ReferenceIndex<'a> {
    targets: HashMap<&'a str, &'a Record>,
    references: Vec<Reference<'a>>,
}

impl<'a> ReferenceIndex<'a> {
    pub fn build(doc: &'a Document) -> Self {
        let mut targets = HashMap::new();
        for record in doc.records() {
            if let Some(xref) = record.xref() {
                targets.entry(xref).or_insert(record);
            }
        }
        let mut references = Vec::new();
        for top in doc.records() {
            top.walk(&mut |node| {
                if let Some(target) = reference_target(node.value()) {
                    references.push(Reference {
                        owner: top.xref(),
                        tag: node.tag(),
                        target,
                    });
                }
            });
        }
        Self {
            targets,
            references,
        }
    }

    pub fn resolve(&self, xref: &str) -> Option<&'a Record> {
        self.targets.get(xref).copied()
    }

    pub fn references(&self) -> &[Reference<'a>] {
        &self.references
    }

    pub fn orphans(&self) -> impl Iterator<Item = &Reference<'a>> {
        self.references
            .iter()
            .filter(|r| !self.targets.contains_key(r.target))
    }
}

pub fn validate(doc: &Document, profile: &Profile, report: &mut ReportBuilder) {
    let index = ReferenceIndex::build(doc);
    let mut stage = report.stage(STAGE);

    for r in index.orphans() {
        stage.issue(
            "orphan_reference",
            r.owner,
            Severity::Error,
            format!("{} points at {}, which does not exist", r.tag, r.target),
        );
    }

    let mut seen = HashSet::new();
    for record in doc.records() {
        if let Some(xref) = record.xref() {
            if !seen.insert(xref) {
                stage.issue(
                    "duplicate_identifier",
                    Some(xref),
                    Severity::Error,
                    format!("{} record reuses identifier {}", record.tag(), xref),
                );
            }
        }
    }

    let in_family: HashSet<&str> = index
        .references()
        .iter()
        .filter(|r| FAMILY_ROLES.contains(&r.tag))
        .map(|r| r.target)
        .collect();

    for record in doc.records() {
        if let Some(required) = profile.schema.get(record.tag()) {
            for tag in required {
                if !record.has_child(tag) {
                    stage.issue(
                        "missing_required_child",
                        record.xref(),
                        Severity::Warning,
                        format!("{} record has no {}", record.tag(), tag),
                    );
                }
            }
        }

        match record.tag() {
            "INDI" => {
                let linked = record.has_child("FAMS")
                    || record.has_child("FAMC")
                    || record.xref().is_some_and(|x| in_family.contains(x));
                if !linked {
                    stage.issue(
                        "disconnected_person",
                        record.xref(),
                        Severity::Warning,
                        "person is not linked to any family",
                    );
                }
                for name in record.children_with_tag("NAME") {
                    if let Some((place, token)) = suffix_in_name(name) {
                        stage.issue(
                            "suffix_in_name",
                            record.xref(),
                            Severity::Warning,
                            format!("Suffix in {}: suffix '{}' should move to NSFX", place, token),
                        );
                    }
                }
            }
            "FAM" => {
                if !FAMILY_ROLES.iter().any(|t| record.has_child(t)) {
                    stage.issue(
                        "empty_family",
                        record.xref(),
                        Severity::Warning,
                        "family has no husband, wife or children",
                    );
                }
                for (first, a, b) in shared_first_names(record, &index) {
                    stage.issue(
                        "siblings_same_first_name",
                        record.xref(),
                        Severity::Info,
                        format!("children {} and {} are both named {}", a, b, first),
                    );
                }
            }
            _ => {}
        }
    }
}

/// The first suffix token in a `NAME`'s `GIVN` or `SURN`, with where it sits.
/// Names that already carry an `NSFX` are left alone.
fn suffix_in_name(name: &Record) -> Option<(&'static str, &str)> {
    if name.child("NSFX").is_some_and(|n| !n.value().trim().is_empty()) {
        return None;
    }
    let parts = [("first name", "GIVN"), ("last name", "SURN")];
    parts.iter().find_map(|&(place, tag)| {
        name.child(tag)?
            .value()
            .split_whitespace()
            .map(|t| t.trim_matches([',', '.']))
            .find(|t| SUFFIXES.contains(&t.to_uppercase().as_str()))
            .map(|t| (place, t))
    })
}

fn first_given_name(person: &Record) -> Option<String> {
    let name = person.child("NAME")?.value();
    let given = name.split('/').next()?;
    let first = given.split_whitespace().next()?;
    Some(crate::persons::name_key(first))
}

/// `(name, earlier child, later child)` for each repeated first name.
fn shared_first_names<'a>(family: &'a Record, index: &ReferenceIndex<'a>) -> Vec<(String, &'a str, &'a str)> {
    let mut firsts: HashMap<String, &'a str> = HashMap::new();
    let mut out = Vec::new();
    for child in family.children_with_tag("CHIL") {
        let Some(xref) = reference_target(child.value()) else {
            continue;
        };
        let Some(name) = index.resolve(xref).and_then(first_given_name) else {
            continue;
        };
        match firsts.get(&name) {
            Some(&earlier) if earlier != xref => out.push((name, earlier, xref)),
            Some(_) => {}
            None => {
                firsts.insert(name, xref);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileTable;
    use crate::report::Report;

    fn run(text: &str) -> Report {
        let profile = ProfileTable::new().get("aggressive").unwrap().clone();
        let doc = Document::parse(text).unwrap();
        let mut builder = ReportBuilder::new();
        validate(&doc, &profile, &mut builder);
        builder.finish(String::new(), "aggressive", true)
    }

    #[test]
    fn test_clean_family_has_no_issues() {
        let report = run(
            "0 @I1@ INDI\n1 NAME A /B/\n1 FAMS @F1@\n0 @I2@ INDI\n1 NAME C /B/\n0 @F1@ FAM\n1 HUSB @I1@\n1 CHIL @I2@\n",
        );
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_orphans_reported_per_reference() {
        let report = run(
            "0 @I1@ INDI\n1 NAME A\n1 FAMS @F9@\n1 FAMC @F9@\n1 BIRT\n2 SOUR @F9@\n",
        );
        let orphans: Vec<_> = report.issues_for("orphan_reference").collect();
        assert_eq!(orphans.len(), 3);
        assert!(orphans.iter().all(|i| i.record_id.as_deref() == Some("@I1@")));
        assert_eq!(orphans[2].message, "SOUR points at @F9@, which does not exist");
    }

    #[test]
    fn test_duplicate_identifier() {
        let report = run("0 @S1@ SOUR\n0 @S1@ SOUR\n0 @S1@ NOTE\n");
        assert_eq!(report.count(STAGE, "duplicate_identifier"), 2);
    }

    #[test]
    fn test_disconnected_and_missing_name() {
        let report = run("0 @I1@ INDI\n1 SEX M\n");
        assert_eq!(report.count(STAGE, "disconnected_person"), 1);
        assert_eq!(report.count(STAGE, "missing_required_child"), 1);
        let missing = report.issues_for("missing_required_child").next().unwrap();
        assert_eq!(missing.message, "INDI record has no NAME");
    }

    #[test]
    fn test_referenced_by_family_is_connected() {
        let report = run("0 @I1@ INDI\n1 NAME A\n0 @F1@ FAM\n1 WIFE @I1@\n");
        assert_eq!(report.count(STAGE, "disconnected_person"), 0);
    }

    #[test]
    fn test_empty_family() {
        let report = run("0 @F1@ FAM\n1 MARR\n");
        assert_eq!(report.count(STAGE, "empty_family"), 1);
    }

    #[test]
    fn test_siblings_same_first_name() {
        let report = run(
            "0 @I1@ INDI\n1 NAME John /Smith/\n1 FAMC @F1@\n\
0 @I2@ INDI\n1 NAME John Henry /Smith/\n1 FAMC @F1@\n\
0 @I3@ INDI\n1 NAME Mary /Smith/\n1 FAMC @F1@\n\
0 @F1@ FAM\n1 CHIL @I1@\n1 CHIL @I2@\n1 CHIL @I3@\n",
        );
        let found: Vec<_> = report.issues_for("siblings_same_first_name").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "children @I1@ and @I2@ are both named john");
    }

    #[test]
    fn test_suffix_in_given_or_surname() {
        let report = run(
            "0 @I1@ INDI\n1 NAME John Jr. /Smith/\n2 GIVN John Jr.\n2 SURN Smith\n1 FAMS @F1@\n\
0 @I2@ INDI\n1 NAME Ann /Lee III/\n2 GIVN Ann\n2 SURN Lee III\n1 FAMS @F1@\n\
0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I2@\n",
        );
        let found: Vec<_> = report.issues_for("suffix_in_name").collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].record_id.as_deref(), Some("@I1@"));
        assert_eq!(found[0].message, "Suffix in first name: suffix 'Jr' should move to NSFX");
        assert_eq!(found[1].message, "Suffix in last name: suffix 'III' should move to NSFX");
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_suffix_with_nsfx_or_without_suffix() {
        let report = run(
            "0 @I1@ INDI\n1 NAME John /Smith/ Jr\n2 GIVN John Jr\n2 NSFX Jr\n1 FAMS @F1@\n\
0 @I2@ INDI\n1 NAME Xavier /Vance/\n2 GIVN Xavier\n2 SURN Vance\n1 FAMS @F1@\n\
0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I2@\n",
        );
        assert_eq!(report.count(STAGE, "suffix_in_name"), 0);
    }

    #[test]
    fn test_custom_schema() {
        let mut profile = ProfileTable::new().get("aggressive").unwrap().clone();
        profile
            .schema
            .insert("FAM".to_string(), vec!["MARR".to_string()]);
        let doc = Document::parse("0 @F1@ FAM\n1 HUSB @I1@\n0 @I1@ INDI\n1 NAME A\n").unwrap();
        let mut builder = ReportBuilder::new();
        validate(&doc, &profile, &mut builder);
        let report = builder.finish(String::new(), "custom", true);
        assert_eq!(report.count(STAGE, "missing_required_child"), 1);
    }
}
