//! Integration tests for `flowsolve check`.
//!
//! These run `flowsolve` as a subprocess on scripts written to a temp
//! directory, so config discovery sees nothing but what each test writes.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use indoc::indoc;

fn flowsolve() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_flowsolve"))
}

fn check(script: &Path, extra: &[&str]) -> Output {
    Command::new(flowsolve())
        .arg("check")
        .arg(script)
        .args(extra)
        .output()
        .expect("failed to run flowsolve")
}

fn write_script(dir: &Path, source: &str) -> PathBuf {
    let path = dir.join("script.toml");
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn clean_script_succeeds() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let script = write_script(
        tmp.path(),
        indoc! {r#"
            vars = 2

            [[step]]
            kind = "unify"
            a = { var = 0 }
            b = { var = 1 }

            [[step]]
            kind = "flow"
            lower = { lit = "x" }
            upper = { var = 0 }

            [[step]]
            kind = "flow"
            lower = { var = 1 }
            upper = "string"
        "#},
    );

    let output = check(&script, &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "flowsolve failed.\nstdout: {stdout}\nstderr: {stderr}"
    );
    assert!(stdout.contains("#0"), "expected variables in output.\nstdout: {stdout}");
    assert!(stderr.contains("0 diagnostics"), "stderr: {stderr}");
}

#[test]
fn diagnostics_exit_with_failure() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let script = write_script(
        tmp.path(),
        indoc! {r#"
            [[step]]
            kind = "flow"
            lower = { object = { props = { name = "string" } } }
            use = { get_prop = { prop = "nmae", tout = "mixed" } }
        "#},
    );

    let output = check(&script, &["--quiet"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stdout.is_empty(), "quiet run printed: {stdout}");
    assert!(stderr.contains("MissingProperty"), "stderr: {stderr}");
    assert!(stderr.contains("name"), "expected a suggestion.\nstderr: {stderr}");
}

#[test]
fn discovered_config_sets_depth() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(
        tmp.path().join("flowsolve.toml"),
        indoc! {"
            [solver]
            max_depth = 2
        "},
    )
    .unwrap();
    let nested = tmp.path().join("scripts");
    std::fs::create_dir(&nested).unwrap();
    let script = write_script(
        &nested,
        indoc! {r#"
            [[step]]
            kind = "flow"
            lower = { read_only_array = { read_only_array = { read_only_array = { lit = 1 } } } }
            upper = { read_only_array = { read_only_array = { read_only_array = "number" } } }
        "#},
    );

    let output = check(&script, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains("RecursionLimitExceeded"), "stderr: {stderr}");

    // The command line wins over the file.
    let output = check(&script, &["--max-depth", "50"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
}

#[test]
fn zero_max_depth_is_rejected() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let script = write_script(
        tmp.path(),
        indoc! {r#"
            [[step]]
            kind = "flow"
            lower = "number"
            upper = "number"
        "#},
    );

    let output = check(&script, &["--max-depth", "0"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "stderr: {stderr}");
    assert!(stdout.is_empty(), "no variables should be printed: {stdout}");
    assert!(stderr.contains("--max-depth"), "stderr: {stderr}");
}

#[test]
fn invalid_script_is_reported() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let script = write_script(
        tmp.path(),
        indoc! {r#"
            vars = 1

            [[step]]
            kind = "resolve"
            var = 4
            term = "null"
        "#},
    );

    let output = check(&script, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("variable 4"), "stderr: {stderr}");
}
