//! CLI integration tests
//!
//! Runs the binary against the commons-compress fixture with the options a
//! user would pass.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

const ENTRY: &str = "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs";

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compress")
}

/// The binary pointed at the fixture with both of its source roots
fn testprune() -> Command {
    let mut cmd = Command::cargo_bin("testprune").unwrap();
    cmd.arg(fixture_dir())
        .args(["-s", "src/main/java", "-s", "src/test/java"])
        .arg("--quiet");
    cmd
}

fn read_report(path: &std::path::Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_cli_help() {
    Command::cargo_bin("testprune")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("testprune"))
        .stdout(predicate::str::contains("--entrypoint"))
        .stdout(predicate::str::contains("--granularity"))
        .stdout(predicate::str::contains("--coverage"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("testprune")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_missing_entrypoint() {
    testprune()
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no entrypoint configured"));
}

#[test]
fn test_cli_unknown_entrypoint_class() {
    testprune()
        .args(["-e", "org.example.Missing#test", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("org.example.Missing"));
}

// ============================================================================
// Reduction Tests
// ============================================================================

#[test]
fn test_cli_dry_run_json() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");

    testprune()
        .args(["-e", ENTRY, "-f", "json", "--dry-run", "--report"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    let value = read_report(&report);
    assert_eq!(value["kind"], "member-static");
    assert_eq!(
        value["entry_methods"][0],
        "org.apache.commons.compress.archivers.ArchiveStreamFactoryTest#shortTextFilesAreNoTARs()"
    );
    let declarations = value["declarations"].as_array().unwrap();
    let entry = declarations
        .iter()
        .find(|d| d["id"] == value["entry_methods"][0])
        .unwrap();
    assert_eq!(entry["decision"], "NO_OP");
    let unused = declarations
        .iter()
        .find(|d| d["id"] == "org.apache.commons.compress.compressors.CompressorException")
        .unwrap();
    assert_eq!(unused["decision"], "REMOVE");

    // nothing written in a dry run
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_cli_terminal_report() {
    testprune()
        .args(["-e", ENTRY, "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("member-static"));
}

#[test]
fn test_cli_writes_reduced_sources() {
    let out = tempfile::tempdir().unwrap();

    testprune()
        .args(["-e", ENTRY, "-o"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let test_root = out.path().join("src/test/java/org/apache/commons/compress");
    let main_root = out.path().join("src/main/java/org/apache/commons/compress");
    let test_file = test_root.join("archivers/ArchiveStreamFactoryTest.java");
    assert!(test_file.exists());
    assert!(main_root.join("archivers/ArchiveException.java").exists());
    assert!(!main_root.join("compressors/CompressorException.java").exists());

    let text = std::fs::read_to_string(test_file).unwrap();
    assert!(text.contains("shortTextFilesAreNoTARs"));
    assert!(!text.contains("unknownArchiverName"));
}

#[test]
fn test_cli_class_granularity() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");

    testprune()
        .args(["-e", ENTRY, "--granularity", "class", "-f", "json", "--dry-run", "--report"])
        .arg(&report)
        .assert()
        .success();

    let value = read_report(&report);
    assert_eq!(value["kind"], "class-static");
    assert!(value["declarations"]
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["decision"] != "STUB"));
}

#[test]
fn test_cli_coverage_seeding() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");

    testprune()
        .args(["-e", ENTRY, "--seeding", "coverage", "--coverage", "jacoco.xml"])
        .args(["-j", "2", "-f", "json", "--dry-run", "--report"])
        .arg(&report)
        .assert()
        .success();

    let value = read_report(&report);
    assert_eq!(value["kind"], "member-coverage");
    assert_eq!(value["stats"]["coverage_seeds"], 20);
    assert_eq!(value["stats"]["coverage_unmatched"], 1);
}

#[test]
fn test_cli_coverage_seeding_needs_report() {
    testprune()
        .args(["-e", ENTRY, "--seeding", "coverage", "--dry-run"])
        .assert()
        .failure();
}

#[test]
fn test_cli_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("testprune.yml");
    std::fs::write(
        &config,
        format!(
            "source_roots:\n  - src/main/java\n  - src/test/java\nentrypoint: \"{}\"\nreduction:\n  granularity: class\n",
            ENTRY
        ),
    )
    .unwrap();
    let report = dir.path().join("report.json");

    Command::cargo_bin("testprune")
        .unwrap()
        .arg(fixture_dir())
        .arg("--config")
        .arg(&config)
        .args(["--quiet", "-f", "json", "--dry-run", "--report"])
        .arg(&report)
        .assert()
        .success();

    assert_eq!(read_report(&report)["kind"], "class-static");
}
