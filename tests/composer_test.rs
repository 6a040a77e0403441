mod common;

use common::{tree, FakeGenerator, Project};
use scriptpack::composer::{compose, copy_file, ComposePlan};
use scriptpack::error::Error;
use scriptpack::flavor::Flavor;
use scriptpack::generator::generate_parsers;
use scriptpack::layout::BuildLayout;
use scriptpack::placeholder::PlaceholderMap;
use scriptpack::renderer::MiniJinjaRenderer;
use scriptpack::resolver::{resolve_templates, TemplateQuery};
use std::fs;

/// Generates the flavor's parsers and composes its staging tree.
fn compose_flavor(project: &Project, flavor: Flavor) -> scriptpack::error::Result<std::path::PathBuf> {
    let config = project.config();
    let layout = BuildLayout::new(config.build_dir());
    let query = TemplateQuery::for_flavor(&config, flavor)?;
    let set = resolve_templates(&config.source_root(), &query)?;
    generate_parsers(&FakeGenerator, &set, &layout.generated_dir(flavor))?;

    let placeholders =
        PlaceholderMap::from_rules(&config.placeholders, &MiniJinjaRenderer::new(), "1.2.3", flavor)?;
    let plan = ComposePlan::for_flavor(&config, &layout, flavor, "1.2.3", placeholders)?;
    compose(&plan)
}

#[test]
fn test_gradle_staging_tree() {
    let project = Project::new();
    let staging = compose_flavor(&project, Flavor::Gradle).unwrap();

    assert_eq!(staging, project.build().join("scripts/gradle"));
    assert_eq!(
        tree(&staging),
        vec![
            "01-validate-incremental-building.sh",
            "LICENSE",
            "README.md",
            "VERSION",
            "lib/export-api-clients/export-api-clients.jar",
            "lib/gradle-cli-parser.sh",
            "lib/gradle-init-scripts/init.gradle",
            "lib/libs.sh",
        ]
    );
}

#[test]
fn test_maven_staging_tree() {
    let project = Project::new();
    let staging = compose_flavor(&project, Flavor::Maven).unwrap();

    assert_eq!(
        tree(&staging),
        vec![
            "01-validate-local-build-caching.sh",
            "LICENSE",
            "README.md",
            "VERSION",
            "lib/libs.sh",
            "lib/maven-cli-parser.sh",
        ]
    );
}

#[test]
fn test_placeholders_are_applied() {
    let project = Project::new();
    let staging = compose_flavor(&project, Flavor::Gradle).unwrap();

    assert_eq!(fs::read_to_string(staging.join("VERSION")).unwrap(), "1.2.3");
    assert_eq!(
        fs::read_to_string(staging.join("README.md")).unwrap(),
        "# Build validation 1.2.3\n"
    );
    assert_eq!(
        fs::read_to_string(staging.join("01-validate-incremental-building.sh")).unwrap(),
        "#!/usr/bin/env bash\nsource \"${SCRIPT_DIR}/lib/gradle-cli-parser.sh\"\n"
    );
    assert_eq!(
        fs::read_to_string(staging.join("lib/libs.sh")).unwrap(),
        "VERSION=1.2.3\n. \"$DIR/lib/x\"\n"
    );
    // Generated parsers and the license are copied verbatim.
    assert_eq!(
        fs::read_to_string(staging.join("lib/gradle-cli-parser.sh")).unwrap(),
        "# generated\n# ARG_OPTIONAL_SINGLE([git-repo])\n"
    );
    assert_eq!(fs::read_to_string(staging.join("LICENSE")).unwrap(), "Apache License 2.0\n");
}

#[test]
fn test_binary_component_copied_raw() {
    let project = Project::new();
    let staging = compose_flavor(&project, Flavor::Gradle).unwrap();
    assert_eq!(
        fs::read(staging.join("lib/export-api-clients/export-api-clients.jar")).unwrap(),
        vec![0xca, 0xfe, 0xba, 0xbe, 0xff]
    );
}

#[test]
fn test_recompose_removes_stale_files() {
    let project = Project::new();
    let staging = compose_flavor(&project, Flavor::Maven).unwrap();
    fs::write(staging.join("stale.sh"), "echo stale\n").unwrap();

    let staging = compose_flavor(&project, Flavor::Maven).unwrap();
    assert!(!staging.join("stale.sh").exists());
    assert_eq!(fs::read_dir(project.build().join("scripts")).unwrap().count(), 1);
}

#[test]
fn test_missing_license_fails_without_staging() {
    let project = Project::new();
    compose_flavor(&project, Flavor::Gradle).unwrap();
    fs::remove_file(project.path().join("LICENSE")).unwrap();

    let err = compose_flavor(&project, Flavor::Gradle).unwrap_err();
    match err {
        Error::CompositionError { flavor, reason } => {
            assert_eq!(flavor, "gradle");
            assert!(reason.contains("LICENSE"));
        }
        other => panic!("Expected CompositionError, got {other:?}"),
    }
    assert!(!project.build().join("scripts/gradle").exists());
    assert_eq!(fs::read_dir(project.build().join("scripts")).unwrap().count(), 0);
}

#[test]
fn test_missing_generated_parsers_fail() {
    let project = Project::new();
    let config = project.config();
    let layout = BuildLayout::new(config.build_dir());
    let plan =
        ComposePlan::for_flavor(&config, &layout, Flavor::Maven, "1.2.3", PlaceholderMap::default())
            .unwrap();

    assert!(matches!(compose(&plan), Err(Error::CompositionError { .. })));
    assert!(!plan.target.exists());
}

#[test]
fn test_shared_dir_without_scripts() {
    let project = Project::new();
    fs::remove_dir_all(project.path().join("components/scripts/lib/gradle-init-scripts")).unwrap();
    fs::remove_file(project.path().join("components/scripts/lib/libs.sh")).unwrap();

    let staging = compose_flavor(&project, Flavor::Maven).unwrap();
    assert!(staging.join("lib/maven-cli-parser.sh").is_file());
    assert!(!staging.join("lib/libs.sh").exists());
}

#[cfg(unix)]
#[test]
fn test_copy_file_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let project = Project::new();
    let source = project.write_executable("run.sh", "echo <HEAD>\n");
    let dest = project.path().join("out/run.sh");
    let map = PlaceholderMap::new([("<HEAD>", "9.9")]).unwrap();

    copy_file(&source, &dest, Some(&map)).unwrap();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "echo 9.9\n");
    assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
}
