//! Installation and invocation of the external parser generator.
//!
//! The generator archive is fetched once per version into the build's tools
//! directory. Unpacking happens next to the final location and is renamed
//! into place, so concurrent runs never observe a half-unpacked tool.
//! Generated parsers follow the same pattern: a flavor's output directory
//! either holds the complete result of one run or does not exist.

use crate::config::GeneratorConfig;
use crate::constants::INSTALL_MARKER;
use crate::error::{Error, Result};
use crate::layout::{temporary_sibling, BuildLayout};
use crate::renderer::TemplateRenderer;
use crate::resolver::TemplateSet;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// An unpacked generator ready to be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub root: PathBuf,
    pub executable: PathBuf,
    /// `false` when an existing installation was reused.
    pub fetched: bool,
}

fn install_marker(name: &str, version: &str, digest: &str) -> String {
    format!("{name} {version} sha256:{digest}\n")
}

/// Returns `true` if `root` holds a finished installation of `name` `version`
/// whose checksum matches `expected_sha256` when one is pinned.
fn is_installed(root: &Path, name: &str, version: &str, expected_sha256: Option<&str>) -> bool {
    let Ok(marker) = fs::read_to_string(root.join(INSTALL_MARKER)) else {
        return false;
    };
    let mut fields = marker.split_whitespace();
    let (Some(marker_name), Some(marker_version), Some(marker_digest)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return false;
    };
    marker_name == name
        && marker_version == version
        && expected_sha256.is_none_or(|expected| {
            marker_digest.strip_prefix("sha256:") == Some(expected.to_lowercase().as_str())
        })
}

/// Reads the generator archive from a local path or downloads it.
fn fetch_archive(source: &str, base_dir: &Path) -> Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        info!("Downloading {source}");
        let response = reqwest::blocking::get(source)
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::GenerationError(format!("cannot download '{source}': {e}")))?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::GenerationError(format!("cannot download '{source}': {e}")))?;
        return Ok(bytes.to_vec());
    }
    let path = base_dir.join(source);
    fs::read(&path).map_err(|e| {
        Error::GenerationError(format!("cannot read generator archive '{}': {e}", path.display()))
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Extracts `bytes` into `target`, returning the directory that holds the
/// tool: the single top-level folder of the archive if there is one.
fn unpack(bytes: Vec<u8>, target: &Path) -> Result<PathBuf> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::GenerationError(format!("invalid generator archive: {e}")))?;
    archive
        .extract(target)
        .map_err(|e| Error::GenerationError(format!("cannot unpack generator archive: {e}")))?;

    let entries: Vec<PathBuf> =
        fs::read_dir(target)?.map(|entry| entry.map(|e| e.path())).collect::<std::io::Result<_>>()?;
    match entries.as_slice() {
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(target.to_path_buf()),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Moves a finished unpack into `install_dir`.
///
/// An installation of the same digest that another run completed meanwhile is
/// kept as is; returns `false` in that case.
fn place_installation(
    unpacked: &Path,
    install_dir: &Path,
    name: &str,
    version: &str,
    digest: &str,
) -> Result<bool> {
    if is_installed(install_dir, name, version, Some(digest)) {
        debug!("{name} {version} was installed concurrently");
        return Ok(false);
    }
    if install_dir.exists() {
        fs::remove_dir_all(install_dir)?;
    }
    if let Err(e) = fs::rename(unpacked, install_dir) {
        if is_installed(install_dir, name, version, Some(digest)) {
            debug!("{name} {version} was installed concurrently");
            return Ok(false);
        }
        return Err(e.into());
    }
    Ok(true)
}

/// Ensures the pinned generator is unpacked below the build's tools directory.
///
/// # Errors
/// * `Error::GenerationError` if the archive cannot be fetched, fails checksum
///   verification, cannot be unpacked or lacks the configured executable
pub fn install_generator(
    config: &GeneratorConfig,
    layout: &BuildLayout,
    renderer: &dyn TemplateRenderer,
    base_dir: &Path,
) -> Result<Installation> {
    let install_dir = layout.tool_install_dir(&config.name, &config.version);
    let executable = install_dir.join(&config.executable);
    let expected = config.sha256.as_deref();

    if is_installed(&install_dir, &config.name, &config.version, expected) {
        debug!("{} {} is already installed", config.name, config.version);
        return Ok(Installation { root: install_dir, executable, fetched: false });
    }

    let source = renderer.render(&config.source, &serde_json::json!({ "version": config.version }))?;
    let bytes = fetch_archive(&source, base_dir)?;
    let digest = sha256_hex(&bytes);
    if let Some(expected) = expected {
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(Error::GenerationError(format!(
                "checksum mismatch for '{source}': expected {expected}, got {digest}"
            )));
        }
    }

    fs::create_dir_all(layout.tools_dir())?;
    let staging = temporary_sibling(&install_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    let result = (|| -> Result<()> {
        let unpacked = unpack(bytes, &staging)?;
        let unpacked_executable = unpacked.join(&config.executable);
        if !unpacked_executable.is_file() {
            return Err(Error::GenerationError(format!(
                "generator archive does not contain '{}'",
                config.executable.display()
            )));
        }
        make_executable(&unpacked_executable)?;
        fs::write(
            unpacked.join(INSTALL_MARKER),
            install_marker(&config.name, &config.version, &digest),
        )?;

        place_installation(&unpacked, &install_dir, &config.name, &config.version, &digest)?;
        Ok(())
    })();
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    result?;

    info!("Installed {} {} into {}", config.name, config.version, install_dir.display());
    Ok(Installation { root: install_dir, executable, fetched: true })
}

/// A tool that turns one entry template into one generated script.
pub trait CodeGenerator {
    fn generate(&self, template: &Path, output: &Path) -> Result<()>;
}

/// Argbash, invoked as `argbash TEMPLATE -o OUTPUT` from the template's directory.
pub struct Argbash {
    executable: PathBuf,
}

impl Argbash {
    pub fn new<P: AsRef<Path>>(executable: P) -> Self {
        Self { executable: executable.as_ref().to_path_buf() }
    }
}

impl From<&Installation> for Argbash {
    fn from(installation: &Installation) -> Self {
        Argbash::new(&installation.executable)
    }
}

impl CodeGenerator for Argbash {
    fn generate(&self, template: &Path, output: &Path) -> Result<()> {
        if !self.executable.is_file() {
            return Err(Error::GenerationError(format!(
                "generator executable '{}' is missing",
                self.executable.display()
            )));
        }
        let executable = fs::canonicalize(&self.executable)?;
        let template = fs::canonicalize(template)?;
        let output = std::path::absolute(output)?;
        let working_dir = template.parent().unwrap_or(Path::new("."));

        debug!("Running {} {} -o {}", executable.display(), template.display(), output.display());
        let result = Command::new(&executable)
            .arg(&template)
            .arg("-o")
            .arg(&output)
            .current_dir(working_dir)
            .output()
            .map_err(|e| {
                Error::GenerationError(format!("cannot run '{}': {e}", executable.display()))
            })?;

        if !result.status.success() {
            return Err(Error::GenerationError(format!(
                "'{}' failed with {}: {}",
                template.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Path of the generated script for `entry`, relative to the output directory.
pub fn generated_path(entry: &Path, templates_dir: &Path) -> PathBuf {
    let relative = entry.strip_prefix(templates_dir).unwrap_or(entry);
    relative.with_extension("sh")
}

fn read_template(source_root: &Path, template: &Path) -> Result<()> {
    let path = source_root.join(template);
    let bytes = fs::read(&path).map_err(|e| {
        Error::GenerationError(format!("cannot read template '{}': {e}", path.display()))
    })?;
    if std::str::from_utf8(&bytes).is_err() {
        return Err(Error::GenerationError(format!(
            "template '{}' is not valid UTF-8",
            path.display()
        )));
    }
    Ok(())
}

/// Generates a script for every entry template of `set` into `output_dir`.
///
/// `output_dir` is replaced as a whole and only once every entry succeeded.
/// Returns the generated paths relative to `output_dir`.
pub fn generate_parsers(
    generator: &dyn CodeGenerator,
    set: &TemplateSet,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    for template in set.entries.iter().chain(&set.supporting) {
        read_template(&set.source_root, template)?;
    }

    if output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
    }
    if let Some(parent) = output_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = temporary_sibling(output_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = set
        .entries
        .iter()
        .map(|entry| {
            let relative = generated_path(entry, &set.templates_dir);
            let target = staging.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            generator.generate(&set.source_root.join(entry), &target)?;
            if !target.is_file() {
                return Err(Error::GenerationError(format!(
                    "generator produced no output for '{}'",
                    entry.display()
                )));
            }
            Ok(relative)
        })
        .collect::<Result<Vec<_>>>();

    match result {
        Ok(generated) => {
            fs::rename(&staging, output_dir)?;
            Ok(generated)
        }
        Err(e) => {
            fs::remove_dir_all(&staging)?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_path() {
        assert_eq!(
            generated_path(
                Path::new("lib/cli-parsers/gradle/01-cli-parser.m4"),
                Path::new("lib/cli-parsers/gradle")
            ),
            PathBuf::from("01-cli-parser.sh")
        );
    }

    #[test]
    fn test_place_installation_keeps_concurrent_install() {
        let dir = tempfile::TempDir::new().unwrap();
        let install_dir = dir.path().join("argbash-2.10.0");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join(INSTALL_MARKER), install_marker("argbash", "2.10.0", "ab")).unwrap();
        fs::write(install_dir.join("in-use"), "running").unwrap();
        let unpacked = dir.path().join("unpacked");
        fs::create_dir_all(&unpacked).unwrap();

        assert!(!place_installation(&unpacked, &install_dir, "argbash", "2.10.0", "ab").unwrap());
        assert!(install_dir.join("in-use").is_file());

        assert!(place_installation(&unpacked, &install_dir, "argbash", "2.10.0", "cd").unwrap());
        assert!(!install_dir.join("in-use").exists());
        assert!(!unpacked.exists());
    }

    #[test]
    fn test_install_marker_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(INSTALL_MARKER), install_marker("argbash", "2.10.0", "ab")).unwrap();
        assert!(is_installed(dir.path(), "argbash", "2.10.0", None));
        assert!(is_installed(dir.path(), "argbash", "2.10.0", Some("AB")));
        assert!(!is_installed(dir.path(), "argbash", "2.10.0", Some("cd")));
        assert!(!is_installed(dir.path(), "argbash", "2.9.0", None));
    }
}
