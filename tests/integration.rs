use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const FAMILY: &str = "0 HEAD\n1 CHAR UTF-8\n\
0 @I1@ INDI\n1 NAME John /Smith/\n1 SEX M\n1 BIRT\n2 DATE 1  jan 1850\n2 PLAC Boston\n1 FAMS @F1@\n\
0 @I2@ INDI\n1 NAME John /Smith/\n1 SEX M\n1 BIRT\n2 DATE 1850\n1 FAMS @F1@\n\
0 @I3@ INDI\n1 NAME Mary /Jones/\n1 BIRT\n2 DATE 32 FOOMONTH 1920\n1 FAMS @F1@\n\
0 @F1@ FAM\n1 HUSB @I1@\n1 HUSB @I2@\n1 WIFE @I3@\n1 CHIL @I9@\n\
0 TRLR\n";

fn gedfix_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gedfix");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let input = root.join("family.ged");
    fs::write(&input, FAMILY).unwrap();

    let config_content = r#"[engine]
profile = "aggressive"

[profiles.careful]
base = "aggressive"
auto_merge_threshold = 99.5
review_threshold = 90.0

[report]
format = "json"
"#;
    let config_path = root.join("gedfix.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, input)
}

fn run_gedfix(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gedfix_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gedfix binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn parse_report(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("report is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_fix_writes_output_and_report() {
    let (tmp, config_path, input) = setup_test_env();
    let out = tmp.path().join("clean.ged");

    let (stdout, stderr, success) = run_gedfix(
        &config_path,
        &["fix", input.to_str().unwrap(), "--out", out.to_str().unwrap()],
    );
    assert!(success, "fix failed: stdout={}, stderr={}", stdout, stderr);

    let report = parse_report(&stdout);
    assert_eq!(report["profile_name"], "aggressive");
    assert_eq!(report["dry_run"], false);
    assert_eq!(report["summary"]["persons.person_merge"], 1);
    assert_eq!(report["summary"]["validate.orphan_reference"], 1);
    assert!(report["document_id"].as_str().unwrap().starts_with("sha256:"));

    let written = fs::read_to_string(&out).unwrap();
    assert_eq!(written.matches(" INDI\n").count(), 2);
    assert!(written.contains("AutoFix: Unrecognized DATE \"32 FOOMONTH 1920\""));
    assert!(written.contains("2 DATE 1 JAN 1850\n"));
    // input is never modified
    assert_eq!(fs::read_to_string(&input).unwrap(), FAMILY);
}

#[test]
fn test_fix_default_output_path() {
    let (tmp, config_path, input) = setup_test_env();
    let (_, stderr, success) = run_gedfix(&config_path, &["fix", input.to_str().unwrap()]);
    assert!(success, "fix failed: {}", stderr);
    assert!(tmp.path().join("family.fixed.ged").exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path, input) = setup_test_env();
    let out = tmp.path().join("clean.ged");

    let (stdout, stderr, success) = run_gedfix(
        &config_path,
        &[
            "fix",
            input.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--dry-run",
        ],
    );
    assert!(success, "dry run failed: {}", stderr);
    assert!(!out.exists());
    let report = parse_report(&stdout);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["summary"]["persons.person_merge"], 1);
}

#[test]
fn test_second_run_is_idempotent() {
    let (tmp, config_path, input) = setup_test_env();
    let first = tmp.path().join("first.ged");
    let second = tmp.path().join("second.ged");

    let (_, stderr, success) = run_gedfix(
        &config_path,
        &["fix", input.to_str().unwrap(), "--out", first.to_str().unwrap()],
    );
    assert!(success, "first run failed: {}", stderr);

    let (stdout, stderr, success) = run_gedfix(
        &config_path,
        &["fix", first.to_str().unwrap(), "--out", second.to_str().unwrap()],
    );
    assert!(success, "second run failed: {}", stderr);

    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
    let report = parse_report(&stdout);
    assert_eq!(report["summary"]["changes"], 0);
}

#[test]
fn test_report_file_and_text_format() {
    let (tmp, config_path, input) = setup_test_env();
    let report_path = tmp.path().join("report.txt");

    let (_, stderr, success) = run_gedfix(
        &config_path,
        &[
            "fix",
            input.to_str().unwrap(),
            "--dry-run",
            "--format",
            "text",
            "--report",
            report_path.to_str().unwrap(),
        ],
    );
    assert!(success, "fix failed: {}", stderr);
    let text = fs::read_to_string(&report_path).unwrap();
    assert!(text.starts_with("gedfix report (dry run)"));
    assert!(text.contains("[persons.person_merge]"));
}

#[test]
fn test_custom_profile_reports_candidate_instead_of_merging() {
    let (_tmp, config_path, input) = setup_test_env();
    let (stdout, stderr, success) = run_gedfix(
        &config_path,
        &[
            "fix",
            input.to_str().unwrap(),
            "--profile",
            "ultra",
            "--auto-merge-threshold",
            "100",
            "--review-threshold",
            "95",
            "--dry-run",
        ],
    );
    assert!(success, "fix failed: {}", stderr);
    let report = parse_report(&stdout);
    assert_eq!(report["profile_name"], "ultra");
    // identical names and years score 100, which still meets the threshold
    assert_eq!(report["summary"]["persons.person_merge"], 1);

    let (stdout, stderr, success) = run_gedfix(
        &config_path,
        &["fix", input.to_str().unwrap(), "--profile", "standard", "--dry-run"],
    );
    assert!(success, "fix failed: {}", stderr);
    let report = parse_report(&stdout);
    assert!(report["summary"].get("persons.person_merge").is_none());
}

#[test]
fn test_inverted_thresholds_fail() {
    let (_tmp, config_path, input) = setup_test_env();
    let (_, stderr, success) = run_gedfix(
        &config_path,
        &[
            "fix",
            input.to_str().unwrap(),
            "--review-threshold",
            "99.9",
            "--dry-run",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("review_threshold"), "stderr: {}", stderr);
}

#[test]
fn test_parse_error_fails_without_output() {
    let (tmp, config_path, _) = setup_test_env();
    let bad = tmp.path().join("bad.ged");
    let out = tmp.path().join("bad.out.ged");
    fs::write(&bad, "0 HEAD\n3 CHAR UTF-8\n").unwrap();

    let (_, stderr, success) = run_gedfix(
        &config_path,
        &["fix", bad.to_str().unwrap(), "--out", out.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("line 2"), "stderr: {}", stderr);
    assert!(!out.exists());
}

#[test]
fn test_scan_never_rewrites() {
    let (tmp, config_path, input) = setup_test_env();
    let (stdout, stderr, success) = run_gedfix(&config_path, &["scan", input.to_str().unwrap()]);
    assert!(success, "scan failed: {}", stderr);
    let report = parse_report(&stdout);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["summary"]["dates.date_unrecognized"], 1);
    assert_eq!(report["summary"]["validate.orphan_reference"], 1);
    assert!(report["summary"].get("persons.person_merge").is_none());
    assert!(!tmp.path().join("family.fixed.ged").exists());
}

#[test]
fn test_profiles_lists_custom_entries() {
    let (_tmp, config_path, _) = setup_test_env();
    let (stdout, stderr, success) = run_gedfix(&config_path, &["profiles"]);
    assert!(success, "profiles failed: {}", stderr);
    for name in ["standard", "aggressive", "ultra", "comprehensive", "careful"] {
        assert!(stdout.contains(name), "missing {} in {}", name, stdout);
    }
    assert!(stdout.contains("*aggressive"));
}

#[test]
fn test_missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_gedfix(&tmp.path().join("nope.toml"), &["profiles"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_latin1_input_round_trips() {
    let (tmp, config_path, _) = setup_test_env();
    let input = tmp.path().join("latin1.ged");
    let out = tmp.path().join("latin1.out.ged");
    let bytes = b"0 HEAD\n0 @I1@ INDI\n1 NAME Jos\xE9 /Garc\xEDa/\n1 FAMS @F1@\n0 @F1@ FAM\n1 HUSB @I1@\n0 TRLR\n";
    fs::write(&input, bytes).unwrap();

    let (_, stderr, success) = run_gedfix(
        &config_path,
        &["fix", input.to_str().unwrap(), "--out", out.to_str().unwrap()],
    );
    assert!(success, "fix failed: {}", stderr);
    assert_eq!(fs::read(&out).unwrap(), bytes.to_vec());
}
