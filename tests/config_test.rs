mod common;

use common::Project;
use scriptpack::config::{find_config, parse_config, read_version};
use scriptpack::constants::CONFIG_FILES;
use scriptpack::error::Error;
use scriptpack::flavor::Flavor;
use std::path::{Path, PathBuf};

#[test]
fn test_load_fixture_config() {
    let project = Project::new();
    let config = project.config();

    assert_eq!(config.generator.name, "argbash");
    assert_eq!(config.generator.version, "2.10.0");
    assert_eq!(config.generator.entry_pattern, "*-cli-parser.m4");
    assert_eq!(config.flavors.keys().copied().collect::<Vec<_>>(), vec![Flavor::Gradle, Flavor::Maven]);
    assert_eq!(config.source_root(), project.path().join("components/scripts"));
    assert_eq!(config.build_dir(), project.build());
    assert_eq!(config.lint.args, vec!["-a", "-x"]);
    assert_eq!(config.read_version().unwrap(), "1.2.3");

    let gradle = config.flavor(Flavor::Gradle).unwrap();
    assert_eq!(gradle.scripts_dir(Flavor::Gradle), PathBuf::from("gradle"));
    assert_eq!(gradle.templates_dir(Flavor::Gradle), PathBuf::from("lib/cli-parsers/gradle"));
}

#[test]
fn test_json_config() {
    let content = r#"{
        "generator": { "version": "2.10.0" },
        "flavors": { "maven": { "archive_name": "maven-scripts" } },
        "release": { "owner": "o", "repo": "r", "tag": "latest", "name": "Latest" }
    }"#;
    let config = parse_config(content, Path::new("/work")).unwrap();
    assert_eq!(config.resolve("build"), PathBuf::from("/work/build"));
    let release = config.release.unwrap();
    assert!(release.prerelease);
    assert!(release.overwrite);
    assert_eq!(release.target_commitish, "main");
    assert_eq!(release.token_env, "GITHUB_ACCESS_TOKEN");
}

#[test]
fn test_invalid_configs() {
    let no_flavors = "generator: { version: '1' }\n";
    assert!(matches!(parse_config(no_flavors, Path::new(".")), Err(Error::ConfigError(_))));

    let duplicate_archives = r#"
generator: { version: "1" }
flavors:
  gradle: { archive_name: scripts }
  maven: { archive_name: scripts }
"#;
    assert!(parse_config(duplicate_archives, Path::new(".")).is_err());

    let unknown_flavor = r#"
generator: { version: "1" }
flavors:
  ant: { archive_name: scripts }
"#;
    assert!(parse_config(unknown_flavor, Path::new(".")).is_err());

    let unknown_field = r#"
generator: { version: "1", colour: red }
flavors:
  maven: { archive_name: scripts }
"#;
    assert!(parse_config(unknown_field, Path::new(".")).is_err());
}

#[test]
fn test_selected_flavors() {
    let config = Project::new().config();
    assert_eq!(config.selected_flavors(&[]).unwrap(), vec![Flavor::Gradle, Flavor::Maven]);
    assert_eq!(config.selected_flavors(&[Flavor::Maven]).unwrap(), vec![Flavor::Maven]);

    let mut single = config.clone();
    single.flavors.shift_remove(&Flavor::Maven);
    assert!(single.selected_flavors(&[Flavor::Maven]).is_err());
}

#[test]
fn test_read_version() {
    let project = Project::new();
    project.write("v1.txt", "  1.2.3 \n\n");
    project.write("empty.txt", "\n");
    assert_eq!(read_version(project.path().join("v1.txt")).unwrap(), "1.2.3");
    assert!(matches!(read_version(project.path().join("empty.txt")), Err(Error::ConfigError(_))));
    assert!(read_version(project.path().join("missing.txt")).is_err());
}

#[test]
fn test_find_config() {
    let project = Project::new();
    assert_eq!(
        find_config(project.path(), None, &CONFIG_FILES).unwrap(),
        project.path().join("scriptpack.yml")
    );
    let explicit = project.path().join("scriptpack.yml");
    assert_eq!(find_config(".", Some(&explicit), &CONFIG_FILES).unwrap(), explicit);
    assert!(find_config(project.path().join("release"), None, &CONFIG_FILES).is_err());
}

#[test]
fn test_token_precedence() {
    let content = r#"
generator: { version: "1" }
flavors:
  maven: { archive_name: scripts }
release:
  owner: o
  repo: r
  tag: latest
  name: Latest
  token_env: SCRIPTPACK_TEST_TOKEN_PRECEDENCE
"#;
    let mut config = parse_config(content, Path::new(".")).unwrap();
    std::env::set_var("SCRIPTPACK_TEST_TOKEN_PRECEDENCE", "from-env");
    let release = config.release.as_mut().unwrap();
    assert_eq!(release.resolve_token().as_deref(), Some("from-env"));

    release.token = Some("from-config".to_string());
    assert_eq!(release.resolve_token().as_deref(), Some("from-config"));

    release.token = Some("  ".to_string());
    assert_eq!(release.resolve_token().as_deref(), Some("from-env"));
    std::env::remove_var("SCRIPTPACK_TEST_TOKEN_PRECEDENCE");
    assert_eq!(release.resolve_token(), None);
}
