//! CLI integration tests for the tsqlfmt binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const FORMATTED: &str = "SELECT\n\ta\n\t,b\nFROM t;\n";
const UNFORMATTED: &str = "SELECT a, b FROM t\n";

/// Helper: get a Command for the tsqlfmt binary.
fn tsqlfmt() -> Command {
    Command::cargo_bin("tsqlfmt").expect("binary should exist")
}

/// Helper: create a temp directory populated with the given files.
fn setup_temp_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }
    dir
}

#[test]
fn test_preformatted_file_unchanged() {
    let dir = setup_temp_dir(&[("query.sql", FORMATTED)]);
    tsqlfmt()
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("unchanged"));
    let content = fs::read_to_string(dir.path().join("query.sql")).unwrap();
    assert_eq!(content, FORMATTED);
}

#[test]
fn test_preformatted_check_mode_passes() {
    let dir = setup_temp_dir(&[("query.sql", FORMATTED)]);
    tsqlfmt().arg("--check").arg(dir.path()).assert().success();
}

#[test]
fn test_unformatted_file_reformatted() {
    let dir = setup_temp_dir(&[("query.sql", UNFORMATTED)]);
    tsqlfmt()
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("reformatted"));
    let content = fs::read_to_string(dir.path().join("query.sql")).unwrap();
    assert_eq!(content, FORMATTED);
}

#[test]
fn test_unformatted_check_mode_fails_without_writing() {
    let dir = setup_temp_dir(&[("query.sql", UNFORMATTED)]);
    tsqlfmt()
        .arg("--check")
        .arg(dir.path())
        .assert()
        .code(1);
    let content = fs::read_to_string(dir.path().join("query.sql")).unwrap();
    assert_eq!(content, UNFORMATTED);
}

#[test]
fn test_diff_mode_prints_diff() {
    let dir = setup_temp_dir(&[("query.sql", UNFORMATTED)]);
    tsqlfmt()
        .arg("--diff")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("+++"))
        .stderr(predicate::str::contains("-SELECT a, b FROM t"));
    let content = fs::read_to_string(dir.path().join("query.sql")).unwrap();
    assert_eq!(content, UNFORMATTED);
}

#[test]
fn test_stdin_writes_to_stdout() {
    tsqlfmt()
        .arg("-")
        .write_stdin(UNFORMATTED)
        .assert()
        .success()
        .stdout(predicate::eq(FORMATTED));
}

#[test]
fn test_stdin_identity_is_lossless() {
    let source = "select  a ,b\n\tfrom t -- tail\n";
    tsqlfmt()
        .arg("--formatter")
        .arg("identity")
        .arg("-")
        .write_stdin(source)
        .assert()
        .success()
        .stdout(predicate::eq(source));
}

#[test]
fn test_stdin_obfuscating_collapses_whitespace() {
    tsqlfmt()
        .arg("--formatter")
        .arg("obfuscating")
        .arg("-")
        .write_stdin("SELECT  a ,  b\nFROM   t\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\n").not());
}

#[test]
fn test_option_overrides() {
    tsqlfmt()
        .arg("--trailing-commas")
        .arg("--spaces")
        .arg("4")
        .arg("-")
        .write_stdin(UNFORMATTED)
        .assert()
        .success()
        .stdout(predicate::eq("SELECT\n    a,\n    b\nFROM t;\n"));
}

#[test]
fn test_lowercase_keywords() {
    tsqlfmt()
        .arg("--lowercase-keywords")
        .arg("-")
        .write_stdin("select a from t\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("select").and(predicate::str::contains("from")));
}

#[test]
fn test_exclude_pattern() {
    let dir = setup_temp_dir(&[("keep.sql", UNFORMATTED), ("gen_skip.sql", UNFORMATTED)]);
    tsqlfmt()
        .arg("--exclude")
        .arg("gen_*")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("1 file(s) processed"));
    let skipped = fs::read_to_string(dir.path().join("gen_skip.sql")).unwrap();
    assert_eq!(skipped, UNFORMATTED);
}

#[test]
fn test_non_sql_files_ignored() {
    let dir = setup_temp_dir(&[("notes.txt", UNFORMATTED)]);
    tsqlfmt()
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("0 file(s) processed"));
}

#[test]
fn test_nested_directories_are_walked() {
    let dir = setup_temp_dir(&[
        ("a.sql", UNFORMATTED),
        ("sub/b.sql", UNFORMATTED),
        ("sub/deeper/c.tsql", UNFORMATTED),
    ]);
    tsqlfmt()
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("3 file(s) processed"));
}

#[test]
fn test_config_file_is_honored() {
    let dir = setup_temp_dir(&[("query.sql", UNFORMATTED)]);
    fs::write(
        dir.path().join("tsqlfmt.toml"),
        "[tsqlfmt]\ntrailing_commas = true\n",
    )
    .unwrap();
    tsqlfmt().arg(dir.path()).assert().success();
    let content = fs::read_to_string(dir.path().join("query.sql")).unwrap();
    assert_eq!(content, "SELECT\n\ta,\n\tb\nFROM t;\n");
}

#[test]
fn test_bad_config_exits_with_error() {
    let dir = setup_temp_dir(&[("query.sql", UNFORMATTED)]);
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[tsqlfmt]\nindent = 3\n").unwrap();
    tsqlfmt()
        .arg("--config")
        .arg(&config)
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_parse_error_still_formats_with_warning() {
    tsqlfmt()
        .arg("-")
        .write_stdin("SELECT (a FROM t\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "--WARNING! ERRORS ENCOUNTERED DURING SQL PARSING!",
        ));
}

#[test]
fn test_quiet_suppresses_summary() {
    let dir = setup_temp_dir(&[("query.sql", FORMATTED)]);
    tsqlfmt()
        .arg("--quiet")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("processed").not());
}
