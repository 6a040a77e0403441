//! Include/exclude glob handling and sorted directory walks.
//! Every path matched here is relative to the walked root and uses `/`
//! separators, so the same patterns work for templates, staging trees and
//! archives.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Compiles a list of glob patterns into a single set.
///
/// # Errors
/// * `Error::PatternError` for any invalid pattern
pub fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.as_ref())?);
    }
    Ok(builder.build()?)
}

/// A pair of include and exclude globs. An empty include list matches everything.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        let include = if include.is_empty() { None } else { Some(build_globset(include)?) };
        Ok(Self { include, exclude: build_globset(exclude)? })
    }

    /// Matches everything except `exclude`.
    pub fn excluding<S: AsRef<str>>(exclude: &[S]) -> Result<Self> {
        Self::new(&[] as &[S], exclude)
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        let included = self.include.as_ref().is_none_or(|set| set.is_match(relative_path));
        included && !self.exclude.is_match(relative_path)
    }
}

/// Returns `true` if any component of `relative_path` is the hidden data directory.
pub fn is_hidden_data(relative_path: &Path, data_dir: &str) -> bool {
    !data_dir.is_empty() && relative_path.components().any(|c| c.as_os_str() == data_dir)
}

/// Converts a relative path to the `/` separated form used for glob matching.
pub fn to_slash(relative_path: &Path) -> String {
    relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks `root` and returns the relative paths of all files accepted by
/// `filter`, in lexicographic order. Hidden data directories are pruned.
pub fn walk_files(root: &Path, filter: &FileFilter, data_dir: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(root)
            .map(|relative| !is_hidden_data(relative, data_dir))
            .unwrap_or(true)
    });
    for entry in walker {
        let entry = entry.map_err(|e| Error::IoError(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).map_err(|e| {
            Error::IoError(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        if filter.matches(&to_slash(relative)) {
            files.push(relative.to_path_buf());
        } else {
            debug!("Skipping {}", relative.display());
        }
    }
    Ok(files)
}
