//! Configuration handling for scriptpack.
//! Loads the pipeline description from YAML or JSON and resolves every path
//! against the directory holding the configuration file.

use crate::constants::DEFAULT_TOKEN_ENV;
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The complete, immutable pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub placeholders: Vec<PlaceholderRule>,
    #[serde(default)]
    pub flavors: IndexMap<Flavor, FlavorConfig>,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub release: Option<ReleaseConfig>,
    /// Directory every relative path is resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub build_dir: PathBuf,
    pub version_file: PathBuf,
    pub source_root: PathBuf,
    pub license: PathBuf,
    /// Relative to `source_root`.
    pub readme: PathBuf,
    /// Relative to `source_root`.
    pub shared_dir: PathBuf,
    /// Hidden data directories never leave the source tree.
    pub data_dir: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            version_file: PathBuf::from("release/version.txt"),
            source_root: PathBuf::from("components/scripts"),
            license: PathBuf::from("LICENSE"),
            readme: PathBuf::from("README.md"),
            shared_dir: PathBuf::from("lib"),
            data_dir: ".data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_name")]
    pub name: String,
    pub version: String,
    /// Local archive path or http(s) URL; may reference `{{ version }}`.
    #[serde(default = "default_generator_source")]
    pub source: String,
    #[serde(default)]
    pub sha256: Option<String>,
    /// Relative to the unpacked installation root.
    #[serde(default = "default_generator_executable")]
    pub executable: PathBuf,
    #[serde(default = "default_entry_pattern")]
    pub entry_pattern: String,
    #[serde(default = "default_supporting_pattern")]
    pub supporting_pattern: String,
}

fn default_generator_name() -> String {
    "argbash".to_string()
}

fn default_generator_source() -> String {
    "https://github.com/matejak/argbash/archive/refs/tags/{{ version }}.zip".to_string()
}

fn default_generator_executable() -> PathBuf {
    PathBuf::from("bin/argbash")
}

fn default_entry_pattern() -> String {
    "*-cli-parser.m4".to_string()
}

fn default_supporting_pattern() -> String {
    "**/*.m4".to_string()
}

/// A literal substitution applied while composing staging trees.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlaceholderRule {
    pub from: String,
    /// Rendered against `{ version, flavor }` before use.
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlavorConfig {
    pub archive_name: String,
    /// Flavor specific scripts, relative to `source_root`. Defaults to the flavor name.
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,
    /// Directory holding this flavor's entry templates, relative to `source_root`.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    #[serde(default)]
    pub template_exclude: Vec<String>,
    /// Globs relative to `source_root` kept out of the shared `lib/` copy.
    #[serde(default)]
    pub shared_exclude: Vec<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl FlavorConfig {
    pub fn scripts_dir(&self, flavor: Flavor) -> PathBuf {
        self.scripts_dir.clone().unwrap_or_else(|| PathBuf::from(flavor.as_str()))
    }

    pub fn templates_dir(&self, flavor: Flavor) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| Path::new("lib").join("cli-parsers").join(flavor.as_str()))
    }
}

/// Files produced elsewhere and bundled verbatim.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    /// File or directory, relative to the configuration directory.
    pub from: PathBuf,
    /// Destination directory inside the staging tree.
    pub into: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub severity: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("shellcheck"),
            args: vec!["-a".to_string(), "-x".to_string()],
            severity: None,
            include: vec!["**/*.sh".to_string()],
            exclude: vec!["lib/**".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_target_commitish")]
    pub target_commitish: String,
    pub tag: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub prerelease: bool,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// MiniJinja template over `{ changelog, version, tag }`.
    #[serde(default = "default_release_body")]
    pub body: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_target_commitish() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_release_body() -> String {
    "{{ changelog }}".to_string()
}

impl ReleaseConfig {
    /// Resolves the token, preferring the configured value over the environment.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

impl Config {
    /// Resolves a path from the configuration against its base directory.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn source_root(&self) -> PathBuf {
        self.resolve(&self.project.source_root)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.project.build_dir)
    }

    pub fn flavor(&self, flavor: Flavor) -> Result<&FlavorConfig> {
        self.flavors
            .get(&flavor)
            .ok_or_else(|| Error::ConfigError(format!("flavor '{flavor}' is not configured")))
    }

    /// Returns the configured flavors, restricted to `filter` when it is not empty.
    pub fn selected_flavors(&self, filter: &[Flavor]) -> Result<Vec<Flavor>> {
        if let Some(missing) = filter.iter().find(|f| !self.flavors.contains_key(*f)) {
            return Err(Error::ConfigError(format!("flavor '{missing}' is not configured")));
        }
        Ok(self
            .flavors
            .keys()
            .copied()
            .filter(|flavor| filter.is_empty() || filter.contains(flavor))
            .collect())
    }

    /// Reads the single-line version file.
    pub fn read_version(&self) -> Result<String> {
        read_version(self.resolve(&self.project.version_file))
    }

    fn validate(&self) -> Result<()> {
        if self.generator.version.trim().is_empty() {
            return Err(Error::ConfigError("generator.version must not be empty".to_string()));
        }
        if self.flavors.is_empty() {
            return Err(Error::ConfigError("at least one flavor must be configured".to_string()));
        }
        for (flavor, flavor_config) in &self.flavors {
            if flavor_config.archive_name.trim().is_empty() {
                return Err(Error::ConfigError(format!(
                    "flavors.{flavor}.archive_name must not be empty"
                )));
            }
        }
        let mut archive_names: Vec<&str> =
            self.flavors.values().map(|f| f.archive_name.as_str()).collect();
        archive_names.sort_unstable();
        archive_names.dedup();
        if archive_names.len() != self.flavors.len() {
            return Err(Error::ConfigError("archive names must be unique".to_string()));
        }
        if let Some(release) = &self.release {
            if release.owner.is_empty() || release.repo.is_empty() || release.tag.is_empty() {
                return Err(Error::ConfigError(
                    "release.owner, release.repo and release.tag must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Reads a version file and returns its trimmed content.
///
/// # Errors
/// * `Error::ConfigError` if the file is missing or empty
pub fn read_version<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("cannot read version file '{}': {e}", path.display()))
    })?;
    let version = content.trim();
    if version.is_empty() {
        return Err(Error::ConfigError(format!("version file '{}' is empty", path.display())));
    }
    Ok(version.to_string())
}

/// Finds the configuration file, either the explicit one or the first of
/// `config_files` present in `dir`.
pub fn find_config<P: AsRef<Path>>(
    dir: P,
    explicit: Option<&Path>,
    config_files: &[&str],
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::ConfigError(format!(
                "Invalid configuration path: {}",
                path.display()
            )));
        }
        return Ok(path.to_path_buf());
    }
    for file in config_files {
        let config_path = dir.as_ref().join(file);
        if config_path.is_file() {
            return Ok(config_path);
        }
    }

    Err(Error::ConfigError(format!(
        "No configuration file found (tried: {})",
        config_files.join(", ")
    )))
}

/// Parses configuration content, trying JSON first and YAML second.
pub fn parse_config(content: &str, base_dir: &Path) -> Result<Config> {
    let mut config: Config = match serde_json::from_str(content) {
        Ok(config) => config,
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration format: {e}")))?,
    };
    config.base_dir = base_dir.to_path_buf();
    config.validate()?;
    Ok(config)
}

/// Loads and validates the configuration file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parse_config(&content, &base_dir)
}
