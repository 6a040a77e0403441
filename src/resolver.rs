//! Template resolution: finds the entry and supporting parser templates of a flavor.

use crate::config::{Config, GeneratorConfig};
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use crate::patterns::{build_globset, to_slash, walk_files, FileFilter};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// The templates one generator run consumes.
///
/// Both collections hold paths relative to the source root, sorted and disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    pub source_root: PathBuf,
    /// Flavor templates directory, relative to `source_root`.
    pub templates_dir: PathBuf,
    pub entries: Vec<PathBuf>,
    pub supporting: Vec<PathBuf>,
}

impl TemplateSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What to look for when resolving a flavor's templates.
#[derive(Debug, Clone)]
pub struct TemplateQuery {
    pub templates_dir: PathBuf,
    pub entry_pattern: String,
    pub supporting_pattern: String,
    pub exclude: Vec<String>,
    pub data_dir: String,
}

impl TemplateQuery {
    pub fn for_flavor(config: &Config, flavor: Flavor) -> Result<Self> {
        let flavor_config = config.flavor(flavor)?;
        let GeneratorConfig { entry_pattern, supporting_pattern, .. } = &config.generator;
        Ok(Self {
            templates_dir: flavor_config.templates_dir(flavor),
            entry_pattern: entry_pattern.clone(),
            supporting_pattern: supporting_pattern.clone(),
            exclude: flavor_config.template_exclude.clone(),
            data_dir: config.project.data_dir.clone(),
        })
    }
}

/// Resolves entry and supporting templates under `source_root`.
///
/// # Errors
/// * `Error::ResolutionError` if `source_root` does not exist
/// * `Error::PatternError` for invalid globs
pub fn resolve_templates(source_root: &Path, query: &TemplateQuery) -> Result<TemplateSet> {
    if !source_root.is_dir() {
        return Err(Error::ResolutionError { root: source_root.display().to_string() });
    }

    let entry_name = build_globset(&[query.entry_pattern.as_str()])?;
    let supporting = build_globset(&[query.supporting_pattern.as_str()])?;
    let templates_prefix = match to_slash(&query.templates_dir) {
        prefix if prefix.is_empty() => prefix,
        prefix => format!("{prefix}/"),
    };

    if !source_root.join(&query.templates_dir).is_dir() {
        warn!(
            "Templates directory '{}' does not exist, no parsers will be generated",
            query.templates_dir.display()
        );
    }

    let mut set = TemplateSet {
        source_root: source_root.to_path_buf(),
        templates_dir: query.templates_dir.clone(),
        ..TemplateSet::default()
    };
    let filter = FileFilter::excluding(&query.exclude)?;
    for relative in walk_files(source_root, &filter, &query.data_dir)? {
        let slashed = to_slash(&relative);
        let is_entry = slashed.starts_with(&templates_prefix)
            && relative.file_name().is_some_and(|name| entry_name.is_match(name));
        if is_entry {
            debug!("Entry template: {slashed}");
            set.entries.push(relative);
        } else if supporting.is_match(&slashed) {
            debug!("Supporting template: {slashed}");
            set.supporting.push(relative);
        }
    }
    Ok(set)
}
