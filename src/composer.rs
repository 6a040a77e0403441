//! Composition of per-flavor staging trees.
//!
//! A staging tree is assembled from a list of [`CopySpec`]s in a hidden
//! sibling directory and renamed into place once every copy succeeded.

use crate::config::Config;
use crate::constants::{LIB_DIR, LICENSE_FILE, VERSION_FILE};
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use crate::layout::{temporary_sibling, BuildLayout};
use crate::patterns::{to_slash, walk_files, FileFilter};
use crate::placeholder::PlaceholderMap;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a set of staged files comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    /// A single file, copied under a new name.
    File { path: PathBuf, rename: String },
    /// All files below a directory accepted by the exclude globs.
    Tree { root: PathBuf, exclude: Vec<String> },
    /// Literal content written to a file.
    Content { name: String, content: String },
}

/// One input of a staging tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySpec {
    pub source: CopySource,
    /// Destination directory relative to the staging root.
    pub into: PathBuf,
    /// Apply the placeholder map to text files.
    pub filtered: bool,
    /// A missing source fails the composition instead of being skipped.
    pub required: bool,
}

/// Everything needed to compose one flavor's staging tree.
#[derive(Debug, Clone)]
pub struct ComposePlan {
    pub flavor: Flavor,
    pub target: PathBuf,
    pub specs: Vec<CopySpec>,
    pub placeholders: PlaceholderMap,
    pub data_dir: String,
}

impl ComposePlan {
    /// Builds the plan for `flavor` from the configuration.
    pub fn for_flavor(
        config: &Config,
        layout: &BuildLayout,
        flavor: Flavor,
        version: &str,
        placeholders: PlaceholderMap,
    ) -> Result<Self> {
        let flavor_config = config.flavor(flavor)?;
        let source_root = config.source_root();
        let data_dir = config.project.data_dir.clone();
        let shared_prefix = format!("{}/", to_slash(&config.project.shared_dir));
        let mut shared_exclude = vec![config.generator.supporting_pattern.clone()];
        shared_exclude.extend(flavor_config.shared_exclude.iter().map(|pattern| {
            pattern.strip_prefix(&shared_prefix).unwrap_or(pattern).to_string()
        }));

        let mut specs = vec![
            CopySpec {
                source: CopySource::File {
                    path: config.resolve(&config.project.license),
                    rename: LICENSE_FILE.to_string(),
                },
                into: PathBuf::new(),
                filtered: false,
                required: true,
            },
            CopySpec {
                source: CopySource::Content {
                    name: VERSION_FILE.to_string(),
                    content: version.to_string(),
                },
                into: PathBuf::new(),
                filtered: false,
                required: true,
            },
            CopySpec {
                source: CopySource::File {
                    path: source_root.join(&config.project.readme),
                    rename: file_name(&config.project.readme),
                },
                into: PathBuf::new(),
                filtered: true,
                required: true,
            },
            CopySpec {
                source: CopySource::Tree {
                    root: source_root.join(flavor_config.scripts_dir(flavor)),
                    exclude: vec![],
                },
                into: PathBuf::new(),
                filtered: true,
                required: true,
            },
            CopySpec {
                source: CopySource::Tree {
                    root: source_root.join(&config.project.shared_dir),
                    exclude: shared_exclude,
                },
                into: PathBuf::from(LIB_DIR),
                filtered: true,
                required: false,
            },
            CopySpec {
                source: CopySource::Tree {
                    root: layout.generated_dir(flavor),
                    exclude: vec![],
                },
                into: PathBuf::from(LIB_DIR),
                filtered: false,
                required: true,
            },
        ];
        for component in &flavor_config.components {
            let path = config.resolve(&component.from);
            let source = if path.is_dir() {
                CopySource::Tree { root: path, exclude: vec![] }
            } else {
                let rename = file_name(&component.from);
                CopySource::File { path, rename }
            };
            specs.push(CopySpec {
                source,
                into: component.into.clone(),
                filtered: false,
                required: true,
            });
        }

        Ok(Self {
            flavor,
            target: layout.staging_dir(flavor),
            specs,
            placeholders,
            data_dir,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Copies one file, applying `placeholders` to UTF-8 text when `filtered`.
/// Permission bits of the source are preserved.
pub fn copy_file(
    source: &Path,
    dest: &Path,
    placeholders: Option<&PlaceholderMap>,
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::read(source)?;
    let content = match (placeholders, std::str::from_utf8(&bytes)) {
        (Some(map), Ok(text)) => map.apply(text).into_bytes(),
        _ => bytes,
    };
    fs::write(dest, content)?;
    fs::set_permissions(dest, fs::metadata(source)?.permissions())?;
    Ok(())
}

/// Resolves every copy source into (destination, source, filtered) triples.
fn collect_files(plan: &ComposePlan) -> Result<BTreeMap<PathBuf, (PathBuf, bool)>> {
    let mut files: BTreeMap<PathBuf, (PathBuf, bool)> = BTreeMap::new();
    let mut insert = |dest: PathBuf, source: PathBuf, filtered: bool| {
        if let Some((previous, _)) = files.insert(dest.clone(), (source, filtered)) {
            warn!("'{}' from {} is replaced by a later source", dest.display(), previous.display());
        }
    };

    for spec in &plan.specs {
        match &spec.source {
            CopySource::File { path, rename } => {
                if !path.is_file() {
                    if spec.required {
                        return Err(missing(plan.flavor, path));
                    }
                    continue;
                }
                insert(spec.into.join(rename), path.clone(), spec.filtered);
            }
            CopySource::Tree { root, exclude } => {
                if !root.is_dir() {
                    if spec.required {
                        return Err(missing(plan.flavor, root));
                    }
                    debug!("Optional directory '{}' does not exist", root.display());
                    continue;
                }
                let filter = FileFilter::excluding(exclude)?;
                for relative in walk_files(root, &filter, &plan.data_dir)? {
                    insert(spec.into.join(&relative), root.join(&relative), spec.filtered);
                }
            }
            CopySource::Content { .. } => {}
        }
    }
    Ok(files)
}

fn missing(flavor: Flavor, path: &Path) -> Error {
    Error::CompositionError {
        flavor: flavor.to_string(),
        reason: format!("required input '{}' does not exist", path.display()),
    }
}

fn write_tree(plan: &ComposePlan, staging: &Path) -> Result<usize> {
    let files = collect_files(plan)?;
    for (dest, (source, filtered)) in &files {
        debug!("Copying {} to {}", source.display(), dest.display());
        let placeholders = filtered.then_some(&plan.placeholders);
        copy_file(source, &staging.join(dest), placeholders)?;
    }
    let mut written = files.len();
    for spec in &plan.specs {
        if let CopySource::Content { name, content } = &spec.source {
            let dest = staging.join(&spec.into).join(name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, content)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Recreates the staging tree described by `plan`.
///
/// # Errors
/// * `Error::CompositionError` if a required input is missing; no staging
///   tree is left behind for the flavor
pub fn compose(plan: &ComposePlan) -> Result<PathBuf> {
    if plan.target.exists() {
        fs::remove_dir_all(&plan.target)?;
    }
    if let Some(parent) = plan.target.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = temporary_sibling(&plan.target);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    match write_tree(plan, &staging) {
        Ok(count) => {
            fs::rename(&staging, &plan.target)?;
            info!("Composed {count} file(s) for {} in {}", plan.flavor, plan.target.display());
            Ok(plan.target.clone())
        }
        Err(e) => {
            fs::remove_dir_all(&staging)?;
            Err(match e {
                Error::IoError(io) => Error::CompositionError {
                    flavor: plan.flavor.to_string(),
                    reason: io.to_string(),
                },
                other => other,
            })
        }
    }
}
