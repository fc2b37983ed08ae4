//! The engine: parse, run the enabled stages in a fixed order, serialize.
//!
//! ```text
//! text ─▶ Document::parse
//!          │
//!          ├─ dates         (profile.stages.dates)
//!          ├─ standardize   (profile.stages.standardize)
//!          ├─ facts         (profile.stages.fact_dedup)
//!          ├─ persons       (profile.stages.person_dedup)
//!          ├─ links         (profile.stages.link_dedup)
//!          ├─ facts         (again; merges can reintroduce duplicate facts)
//!          └─ validate      (profile.stages.validate, read-only)
//!          │
//!          ▼
//!        Document::to_text + Report
//! ```
//!
//! A run either returns the full output and report, or fails before anything
//! is produced.

use tracing::{debug, info};

use crate::error::EngineError;
use crate::profile::{Profile, ProfileOverrides, ProfileTable};
use crate::report::{document_id, Report, ReportBuilder};
use crate::tree::Document;
use crate::{dates, facts, persons, standardize, validate};

/// One transformation step over a fully built document.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn enabled(&self, profile: &Profile) -> bool;

    fn apply(
        &self,
        doc: &mut Document,
        profile: &Profile,
        report: &mut ReportBuilder,
    ) -> Result<(), EngineError>;
}

pub struct DateStage;

impl Stage for DateStage {
    fn name(&self) -> &'static str {
        dates::STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.dates
    }

    fn apply(&self, doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        dates::normalize_dates(doc, profile, report);
        Ok(())
    }
}

pub struct StandardizeStage;

impl Stage for StandardizeStage {
    fn name(&self) -> &'static str {
        standardize::STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.standardize
    }

    fn apply(&self, doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        standardize::standardize(doc, profile, report);
        Ok(())
    }
}

pub struct FactDedupStage;

impl Stage for FactDedupStage {
    fn name(&self) -> &'static str {
        facts::STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.fact_dedup
    }

    fn apply(&self, doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        facts::dedupe_facts(doc, profile, report);
        Ok(())
    }
}

pub struct PersonDedupStage;

impl Stage for PersonDedupStage {
    fn name(&self) -> &'static str {
        persons::STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.person_dedup
    }

    fn apply(&self, doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        persons::dedupe_persons(doc, profile, report)?;
        Ok(())
    }
}

pub struct LinkDedupStage;

impl Stage for LinkDedupStage {
    fn name(&self) -> &'static str {
        facts::LINK_STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.link_dedup
    }

    fn apply(&self, doc: &mut Document, _profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        facts::dedupe_links(doc, report);
        Ok(())
    }
}

pub struct ValidateStage;

impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        validate::STAGE
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.stages.validate
    }

    fn apply(&self, doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) -> Result<(), EngineError> {
        validate::validate(doc, profile, report);
        Ok(())
    }
}

/// The default stage order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(DateStage),
        Box::new(StandardizeStage),
        Box::new(FactDedupStage),
        Box::new(PersonDedupStage),
        Box::new(LinkDedupStage),
        Box::new(FactDedupStage),
        Box::new(ValidateStage),
    ]
}

/// Output of a successful run.
#[derive(Debug)]
pub struct RunOutput {
    pub document: Document,
    /// Serialized document; the caller decides whether to write it.
    pub text: String,
    pub report: Report,
}

/// A configured pipeline bound to one resolved profile.
pub struct Engine {
    profile: Profile,
    stages: Vec<Box<dyn Stage>>,
}

impl Engine {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            stages: default_stages(),
        }
    }

    /// Resolve `name` in `table` (with overrides) and build an engine for it.
    pub fn from_table(
        table: &ProfileTable,
        name: &str,
        overrides: &ProfileOverrides,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(table.resolve(name, overrides)?))
    }

    /// Replace the stage list.
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Parse `text` and transform it. `dry_run` only marks the report.
    pub fn run(&self, text: &str, dry_run: bool) -> Result<RunOutput, EngineError> {
        let mut doc = Document::parse(text)?;
        debug!(records = doc.records().len(), "document parsed");

        let mut builder = ReportBuilder::new();
        for stage in self.stages.iter().filter(|s| s.enabled(&self.profile)) {
            let before = builder.changes().len();
            stage.apply(&mut doc, &self.profile, &mut builder)?;
            debug!(
                stage = stage.name(),
                changes = builder.changes().len() - before,
                "stage complete"
            );
        }

        let report = builder.finish(document_id(text), &self.profile.name, dry_run);
        info!(
            profile = %self.profile.name,
            changes = report.changes.len(),
            issues = report.issues.len(),
            dry_run,
            "run complete"
        );
        let text = doc.to_text();
        Ok(RunOutput {
            document: doc,
            text,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSY: &str = "0 HEAD\n1 CHAR UTF-8\n\
0 @I1@ INDI\n1 NAME John /Smith/\n1 SEX M\n1 BIRT\n2 DATE 1  jan 1850\n1 BIRT\n2 DATE 1 JAN 1850\n2 PLAC Boston\n1 FAMS @F1@\n\
0 @I2@ INDI\n1 NAME John /Smith/\n1 SEX M\n1 BIRT\n2 DATE 1850\n1 DEAT\n2 DATE 1/2/1900\n1 FAMS @F1@\n\
0 @F1@ FAM\n1 HUSB @I1@\n1 HUSB @I2@\n1 CHIL @I9@\n\
0 TRLR\n";

    fn engine(name: &str) -> Engine {
        Engine::from_table(&ProfileTable::new(), name, &ProfileOverrides::default()).unwrap()
    }

    #[test]
    fn test_full_run() {
        let out = engine("ultra").run(MESSY, false).unwrap();
        let report = &out.report;
        assert_eq!(report.profile_name, "ultra");
        assert_eq!(report.count("persons", "person_merge"), 1);
        assert_eq!(report.count("links", "duplicate_name"), 1);
        assert_eq!(report.count("validate", "orphan_reference"), 1);

        let people: Vec<_> = out
            .document
            .records()
            .iter()
            .filter(|r| r.tag() == "INDI")
            .collect();
        assert_eq!(people.len(), 1);
        // @I2@ carries more descendants, so it survives
        let person = people[0];
        assert_eq!(person.xref(), Some("@I2@"));
        assert_eq!(person.children_with_tag("FAMS").count(), 1);
        let birth: Vec<_> = person.children_with_tag("BIRT").collect();
        assert_eq!(birth.len(), 1);
        assert_eq!(birth[0].child("PLAC").unwrap().value(), "Boston");

        let family = out.document.find("@F1@").unwrap();
        let husbands: Vec<_> = family.children_with_tag("HUSB").map(|r| r.value()).collect();
        assert_eq!(husbands, vec!["@I2@"]);
        assert!(!out.text.contains("1 HUSB @I1@"));
        assert!(out
            .text
            .contains("1 NOTE AutoFix: Merged duplicate record @I1@ (similarity 100.0)"));
    }

    #[test]
    fn test_standard_profile_leaves_people_alone() {
        let out = engine("standard").run(MESSY, true).unwrap();
        assert!(out.report.dry_run);
        assert!(out.document.find("@I2@").is_some());
        assert_eq!(out.report.count("persons", "person_merge"), 0);
        assert_eq!(out.report.count("validate", "orphan_reference"), 0);
        assert_eq!(out.report.count("dates", "date_normalize"), 1);
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let engine = engine("aggressive");
        let first = engine.run(MESSY, false).unwrap();
        let second = engine.run(&first.text, false).unwrap();
        assert_eq!(second.text, first.text);
        assert!(second.report.changes.is_empty(), "{:?}", second.report.changes);
    }

    #[test]
    fn test_dry_run_report_matches_real_run() {
        let engine = engine("aggressive");
        let dry = engine.run(MESSY, true).unwrap();
        let real = engine.run(MESSY, false).unwrap();
        assert_eq!(dry.report.changes, real.report.changes);
        assert_eq!(dry.report.issues, real.report.issues);
        assert_eq!(dry.report.document_id, real.report.document_id);
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let err = engine("aggressive").run("0 HEAD\n2 CHAR UTF-8\n", false).unwrap_err();
        assert!(matches!(err, EngineError::Parse(ref e) if e.line_number == 2));
    }

    #[test]
    fn test_unknown_profile() {
        let err = Engine::from_table(&ProfileTable::new(), "gentle", &ProfileOverrides::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Profile(_)));
    }

    #[test]
    fn test_custom_stage_list() {
        let out = engine("aggressive")
            .with_stages(vec![Box::new(ValidateStage)])
            .run(MESSY, true)
            .unwrap();
        assert!(out.report.changes.is_empty());
        assert_eq!(out.text, MESSY);
    }
}
