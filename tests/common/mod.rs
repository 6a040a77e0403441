#![allow(dead_code)]

use scriptpack::config::{load_config, Config};
use scriptpack::error::{Error, Result};
use scriptpack::generator::CodeGenerator;
use scriptpack::prompt::Prompter;
use scriptpack::publisher::{NewRelease, Release, ReleaseHost};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const CONFIG: &str = r#"
project:
  build_dir: build
generator:
  version: "2.10.0"
  source: tools/argbash-{{ version }}.zip
placeholders:
  - { from: "/../lib", to: "/lib" }
  - { from: "<HEAD>", to: "{{ version }}" }
flavors:
  gradle:
    archive_name: gradle-build-validation
    shared_exclude: ["lib/cli-parsers/**"]
    components:
      - { from: components/tool, into: lib/export-api-clients }
  maven:
    archive_name: maven-build-validation
    shared_exclude: ["lib/cli-parsers/**", "lib/gradle-init-scripts/**"]
lint:
  program: tools/fake-shellcheck
release:
  owner: gradle
  repo: build-validation-scripts
  tag: development-latest
  name: "Development release {{ version }}"
  token_env: SCRIPTPACK_TEST_UNSET_TOKEN
"#;

pub const FAKE_SHELLCHECK: &str = r#"#!/bin/sh
echo "$@" > "$0.args"
for arg in "$@"; do
  case "$arg" in
    *.sh)
      if grep -q BAD "$arg"; then
        printf '{"comments":[{"file":"%s","line":1,"endLine":1,"column":1,"endColumn":4,"level":"warning","code":2034,"message":"BAD appears unused."}]}' "$arg"
        exit 1
      fi
      ;;
  esac
done
printf '{"comments":[]}'
"#;

pub const FAKE_ARGBASH: &str = r##"#!/bin/sh
case "$1" in
  *broken*) echo "malformed template" >&2; exit 3 ;;
esac
{ echo "# ARGBASH generated"; cat "$1"; } > "$3"
"##;

/// A throwaway project laid out like a script bundle repository.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let project = Self { dir: TempDir::new().unwrap() };
        project.write("scriptpack.yml", CONFIG);
        project.write("LICENSE", "Apache License 2.0\n");
        project.write("release/version.txt", "1.2.3\n");
        project.write("components/scripts/README.md", "# Build validation <HEAD>\n");
        project.write(
            "components/scripts/gradle/01-validate-incremental-building.sh",
            "#!/usr/bin/env bash\nsource \"${SCRIPT_DIR}/../lib/gradle-cli-parser.sh\"\n",
        );
        project.write("components/scripts/gradle/.data/state.txt", "private\n");
        project.write(
            "components/scripts/maven/01-validate-local-build-caching.sh",
            "#!/usr/bin/env bash\necho <HEAD>\n",
        );
        project.write("components/scripts/lib/libs.sh", "VERSION=<HEAD>\n. \"$DIR/../lib/x\"\n");
        project.write("components/scripts/lib/gradle-init-scripts/init.gradle", "// init\n");
        project.write("components/scripts/lib/cli-parsers/shared.m4", "# shared options\n");
        project.write(
            "components/scripts/lib/cli-parsers/gradle/gradle-cli-parser.m4",
            "# ARG_OPTIONAL_SINGLE([git-repo])\n",
        );
        project.write(
            "components/scripts/lib/cli-parsers/maven/maven-cli-parser.m4",
            "# ARG_OPTIONAL_SINGLE([goals])\n",
        );
        project.write_bytes("components/tool/export-api-clients.jar", &[0xca, 0xfe, 0xba, 0xbe, 0xff]);
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        self.write_bytes(relative, content.as_bytes())
    }

    pub fn write_bytes(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[cfg(unix)]
    pub fn write_executable(&self, relative: &str, content: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.write(relative, content);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn config(&self) -> Config {
        load_config(self.path().join("scriptpack.yml")).unwrap()
    }

    pub fn build(&self) -> PathBuf {
        self.path().join("build")
    }
}

/// Copies the template with a marker line in front.
pub struct FakeGenerator;

impl CodeGenerator for FakeGenerator {
    fn generate(&self, template: &Path, output: &Path) -> Result<()> {
        let content = fs::read_to_string(template)?;
        if content.contains("broken") {
            return Err(Error::GenerationError(format!("malformed '{}'", template.display())));
        }
        fs::write(output, format!("# generated\n{content}"))?;
        Ok(())
    }
}

/// Builds a zip holding `files` below a single `root` folder.
pub fn generator_archive(root: &str, files: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer.add_directory(format!("{root}/"), SimpleFileOptions::default()).unwrap();
    for (name, content, mode) in files {
        writer
            .start_file(format!("{root}/{name}"), SimpleFileOptions::default().unix_permissions(*mode))
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Relative file paths below `root`, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    files.sort();
    files
}

/// What an [`InMemoryHost`] was asked to do.
#[derive(Debug, Default)]
pub struct HostState {
    pub releases: Vec<Release>,
    pub created: Vec<NewRelease>,
    pub deleted: Vec<String>,
    pub uploads: Vec<(u64, String, Vec<u8>)>,
}

/// A release host that keeps everything in memory.
#[derive(Clone, Default)]
pub struct InMemoryHost {
    pub state: Rc<RefCell<HostState>>,
}

impl InMemoryHost {
    pub fn with_release(tag: &str) -> Self {
        let host = Self::default();
        host.state.borrow_mut().releases.push(Release {
            id: 1,
            tag_name: tag.to_string(),
            upload_url: "https://uploads.example.com/releases/1/assets{?name,label}".to_string(),
            html_url: format!("https://example.com/releases/{tag}"),
        });
        host
    }
}

impl ReleaseHost for InMemoryHost {
    fn find_release(&self, tag: &str) -> Result<Option<Release>> {
        Ok(self.state.borrow().releases.iter().find(|r| r.tag_name == tag).cloned())
    }

    fn delete_release(&self, release: &Release) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.releases.retain(|r| r.id != release.id);
        state.deleted.push(release.tag_name.clone());
        Ok(())
    }

    fn create_release(&self, release: &NewRelease) -> Result<Release> {
        let mut state = self.state.borrow_mut();
        let id = 100 + state.created.len() as u64;
        let created = Release {
            id,
            tag_name: release.tag_name.clone(),
            upload_url: format!("https://uploads.example.com/releases/{id}/assets{{?name,label}}"),
            html_url: format!("https://example.com/releases/{}", release.tag_name),
        };
        state.created.push(release.clone());
        state.releases.push(created.clone());
        Ok(created)
    }

    fn upload_asset(&self, release: &Release, name: &str, content: Vec<u8>) -> Result<()> {
        self.state.borrow_mut().uploads.push((release.id, name.to_string(), content));
        Ok(())
    }
}

/// Answers every confirmation with a fixed value.
pub struct FixedPrompter(pub bool);

impl Prompter for FixedPrompter {
    fn confirm(&self, skip: bool, _prompt: String) -> Result<bool> {
        Ok(skip || self.0)
    }
}

/// Answers yes and counts how often it was asked.
#[derive(Clone, Default)]
pub struct CountingPrompter {
    pub asked: Rc<Cell<usize>>,
}

impl Prompter for CountingPrompter {
    fn confirm(&self, _skip: bool, _prompt: String) -> Result<bool> {
        self.asked.set(self.asked.get() + 1);
        Ok(true)
    }
}
