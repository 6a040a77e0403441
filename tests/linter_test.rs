#![cfg(unix)]

mod common;

use common::{Project, FAKE_SHELLCHECK};
use scriptpack::error::Error;
use scriptpack::flavor::Flavor;
use scriptpack::linter::Linter;
use std::fs;

fn project_with_staging() -> Project {
    let project = Project::new();
    project.write_executable("tools/fake-shellcheck", FAKE_SHELLCHECK);
    project.write("build/scripts/gradle/01-validate.sh", "#!/usr/bin/env bash\necho ok\n");
    project.write("build/scripts/gradle/lib/libs.sh", "BAD=1\n");
    project.write("build/scripts/gradle/README.md", "BAD\n");
    project
}

#[test]
fn test_clean_scripts_pass() {
    let project = project_with_staging();
    let config = project.config();
    let linter = Linter::from_config(&config).unwrap();
    let reports = project.build().join("reports/shellcheck-gradle");

    let report = linter.run(Flavor::Gradle, &project.build().join("scripts/gradle"), &reports).unwrap();

    assert!(report.passed());
    assert_eq!(report.files, vec!["01-validate.sh".to_string()]);
    assert_eq!(report.reports.len(), 3);
    assert!(reports.join("shellcheck.txt").is_file());
    assert!(reports.join("shellcheck.xml").is_file());
    assert!(reports.join("shellcheck.html").is_file());

    let args = fs::read_to_string(project.path().join("tools/fake-shellcheck.args")).unwrap();
    assert_eq!(args.trim(), "-a -x -f json1 01-validate.sh");
}

#[test]
fn test_findings_are_reported() {
    let project = project_with_staging();
    project.write("build/scripts/gradle/02-broken.sh", "#!/usr/bin/env bash\nBAD=1\n");
    let mut config = project.config();
    config.lint.severity = Some("warning".to_string());
    let linter = Linter::from_config(&config).unwrap();
    let reports = project.build().join("reports/shellcheck-gradle");

    let report = linter.run(Flavor::Gradle, &project.build().join("scripts/gradle"), &reports).unwrap();

    assert!(!report.passed());
    assert_eq!(report.count(), 1);
    assert_eq!(report.diagnostics[0].file, "02-broken.sh");
    assert_eq!(report.diagnostics[0].code, 2034);

    let args = fs::read_to_string(project.path().join("tools/fake-shellcheck.args")).unwrap();
    assert_eq!(args.trim(), "-a -x --severity=warning -f json1 01-validate.sh 02-broken.sh");

    let text = fs::read_to_string(reports.join("shellcheck.txt")).unwrap();
    assert!(text.contains("02-broken.sh:1:1: warning: BAD appears unused. [SC2034]"));
    let xml = fs::read_to_string(reports.join("shellcheck.xml")).unwrap();
    assert!(xml.contains(r#"<file name="01-validate.sh">"#));
    assert!(xml.contains(r#"source="ShellCheck.SC2034""#));
}

#[test]
fn test_no_scripts_pass_without_running() {
    let project = Project::new();
    project.write_executable("tools/fake-shellcheck", FAKE_SHELLCHECK);
    project.write("build/scripts/maven/README.md", "readme\n");
    let linter = Linter::from_config(&project.config()).unwrap();

    let report = linter
        .run(Flavor::Maven, &project.build().join("scripts/maven"), &project.build().join("reports"))
        .unwrap();

    assert!(report.passed());
    assert!(report.files.is_empty());
    assert!(!project.path().join("tools/fake-shellcheck.args").exists());
}

#[test]
fn test_crashing_analyzer() {
    let project = project_with_staging();
    project.write_executable("tools/fake-shellcheck", "#!/bin/sh\necho boom >&2\nexit 2\n");
    let linter = Linter::from_config(&project.config()).unwrap();

    let err = linter
        .run(Flavor::Gradle, &project.build().join("scripts/gradle"), &project.build().join("reports"))
        .unwrap_err();
    match err {
        Error::LintError { flavor, reason } => {
            assert_eq!(flavor, "gradle");
            assert!(reason.contains("boom"));
        }
        other => panic!("Expected LintError, got {other:?}"),
    }
}

#[test]
fn test_missing_analyzer() {
    let project = project_with_staging();
    let linter = Linter::from_config(&project.config()).unwrap();
    fs::remove_file(project.path().join("tools/fake-shellcheck")).unwrap();

    let err = linter
        .run(Flavor::Gradle, &project.build().join("scripts/gradle"), &project.build().join("reports"))
        .unwrap_err();
    assert!(matches!(err, Error::LintError { .. }));
}
