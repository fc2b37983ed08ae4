use gedfix_core::facts::completeness_score;
use gedfix_core::line::reference_target;
use gedfix_core::profile::CompletenessWeights;
use gedfix_core::{Document, Engine, ProfileOverrides, ProfileTable, Record, StageToggles};

fn engine(name: &str, overrides: ProfileOverrides) -> Engine {
    Engine::from_table(&ProfileTable::new(), name, &overrides).unwrap()
}

fn references_to(doc: &Document, target: &str) -> usize {
    let mut count = 0;
    doc.walk(|_, node| {
        if reference_target(node.value()) == Some(target) {
            count += 1;
        }
    });
    count
}

#[test]
fn test_fact_dedup_keeps_richer_birth() {
    let text = "0 @I1@ INDI\n1 NAME Ann /Lee/\n1 BIRT\n2 DATE 1 JAN 1900\n\
1 BIRT\n2 DATE 1 JAN 1900\n2 PLAC Salem\n2 SOUR @S1@\n0 @S1@ SOUR\n";
    let doc = Document::parse(text).unwrap();
    let weights = CompletenessWeights::default();
    let scores: Vec<u32> = doc.records()[0]
        .children_with_tag("BIRT")
        .map(|b| completeness_score(b, &weights))
        .collect();
    assert_eq!(scores, vec![11, 19]);

    let out = engine("aggressive", ProfileOverrides::default())
        .run(text, false)
        .unwrap();
    let births: Vec<&Record> = out.document.records()[0].children_with_tag("BIRT").collect();
    assert_eq!(births.len(), 1);
    assert_eq!(births[0].child("PLAC").unwrap().value(), "Salem");
    assert!(births[0].has_child("SOUR"));
    assert_eq!(out.report.count("facts", "duplicate_fact"), 1);
}

#[test]
fn test_unrecognized_date_annotated_exactly_once() {
    let text = "0 @I1@ INDI\n1 NAME Ann /Lee/\n1 BIRT\n2 DATE 32 FOOMONTH 1920\n";
    let overrides = ProfileOverrides {
        note_prefix: Some("Check:".to_string()),
        ..Default::default()
    };
    let engine = engine("standard", overrides);

    let first = engine.run(text, false).unwrap();
    let birth = first.document.records()[0].child("BIRT").unwrap();
    assert_eq!(birth.child("DATE").unwrap().value(), "32 FOOMONTH 1920");
    let notes: Vec<&Record> = birth.children_with_tag("NOTE").collect();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].value().starts_with("Check: "));

    let second = engine.run(&first.text, false).unwrap();
    assert_eq!(second.text, first.text);
    let birth = second.document.records()[0].child("BIRT").unwrap();
    assert_eq!(birth.children_with_tag("NOTE").count(), 1);
}

#[test]
fn test_auto_merge_unions_children_and_rewrites_references() {
    let text = "0 @I1@ INDI\n1 NAME William /Hart/\n1 BIRT\n2 DATE 1850\n1 FAMS @F1@\n\
0 @I2@ INDI\n1 NAME William /Hart/\n1 BIRT\n2 DATE 1850\n1 OCCU Cooper\n1 FAMC @F2@\n\
0 @F1@ FAM\n1 HUSB @I1@\n\
0 @F2@ FAM\n1 CHIL @I2@\n\
0 @N1@ NOTE see @I2@\n1 CONT @I2@\n";
    let overrides = ProfileOverrides {
        auto_merge_threshold: Some(95.0),
        review_threshold: Some(90.0),
        ..Default::default()
    };
    let out = engine("aggressive", overrides).run(text, false).unwrap();
    assert_eq!(out.report.count("persons", "person_merge"), 1);

    let people: Vec<&Record> = out
        .document
        .records()
        .iter()
        .filter(|r| r.tag() == "INDI")
        .collect();
    assert_eq!(people.len(), 1);
    let survivor = people[0];
    let removed = if survivor.xref() == Some("@I1@") { "@I2@" } else { "@I1@" };
    for tag in ["NAME", "BIRT", "FAMS", "FAMC", "OCCU"] {
        assert!(survivor.has_child(tag), "missing {}", tag);
    }
    assert_eq!(references_to(&out.document, removed), 0);
    assert_eq!(out.report.count("validate", "orphan_reference"), 0);
}

#[test]
fn test_orphan_count_matches_reference_count() {
    for k in [1usize, 3, 7] {
        let mut text = String::from("0 @I1@ INDI\n1 NAME Ann /Lee/\n");
        for _ in 0..k {
            text.push_str("1 FAMS @F404@\n");
        }
        let overrides = ProfileOverrides {
            stages: Some(StageToggles::scan()),
            ..Default::default()
        };
        let out = engine("aggressive", overrides).run(&text, true).unwrap();
        assert_eq!(out.report.count("validate", "orphan_reference"), k);
    }
}

#[test]
fn test_fact_groups_keep_exactly_one_maximum() {
    let weights = CompletenessWeights::default();
    // (group, index expected to survive)
    let groups: Vec<(Vec<&str>, usize)> = vec![
        (vec!["2 DATE 1900", "2 DATE 1900\n2 PLAC X"], 1),
        (vec!["2 DATE 1900", "2 DATE 1901", "2 PLAC X"], 0),
        (vec!["2 PLAC X", "2 NOTE n", "2 SOUR @S1@\n3 PAGE 1", "2 DATE 1900"], 3),
        (
            vec!["2 NOTE a", "2 PLAC X", "2 PLAC Y", "2 DATE 1901\n2 NOTE b", "2 DATE 1902\n2 NOTE c"],
            3,
        ),
    ];
    for (members, winner) in groups {
        let mut text = String::from("0 @I1@ INDI\n1 NAME A\n");
        for body in &members {
            text.push_str("1 DEAT\n");
            text.push_str(body);
            text.push('\n');
        }
        let before = Document::parse(&text).unwrap();
        let candidates: Vec<&Record> = before.records()[0].children_with_tag("DEAT").collect();
        let best = candidates
            .iter()
            .map(|f| completeness_score(f, &weights))
            .max()
            .unwrap();

        let out = engine("aggressive", ProfileOverrides::default())
            .run(&text, false)
            .unwrap();
        let left: Vec<&Record> = out.document.records()[0].children_with_tag("DEAT").collect();
        assert_eq!(left.len(), 1);
        assert_eq!(completeness_score(left[0], &weights), best);
        assert_eq!(left[0].signature(), candidates[winner].signature());
    }
}

#[test]
fn test_strict_merge_failure_aborts_run() {
    let text = "0 @I1@ INDI\n1 NAME Ann /Lee/\n0 @I2@ INDI\n1 NAME Ann /Lee/\n0 @I2@ INDI\n1 NAME Bob\n";
    let overrides = ProfileOverrides {
        strict: Some(true),
        ..Default::default()
    };
    let err = engine("aggressive", overrides).run(text, false).unwrap_err();
    assert!(matches!(err, gedfix_core::EngineError::MergeConsistency(_)));

    let out = engine("aggressive", ProfileOverrides::default())
        .run(text, false)
        .unwrap();
    assert_eq!(out.report.count("persons", "merge_failed"), 1);
    assert_eq!(out.report.count("validate", "duplicate_identifier"), 1);
}
