//! Locations of everything the pipeline writes below the build directory.

use crate::constants::REPORT_BASENAME;
use crate::flavor::Flavor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new<P: AsRef<Path>>(build_dir: P) -> Self {
        Self { root: build_dir.as_ref().to_path_buf() }
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn tool_install_dir(&self, name: &str, version: &str) -> PathBuf {
        self.tools_dir().join(format!("{name}-{version}"))
    }

    pub fn generated_dir(&self, flavor: Flavor) -> PathBuf {
        self.root.join("generated").join(flavor.as_str())
    }

    pub fn staging_dir(&self, flavor: Flavor) -> PathBuf {
        self.root.join("scripts").join(flavor.as_str())
    }

    pub fn distributions_dir(&self) -> PathBuf {
        self.root.join("distributions")
    }

    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.distributions_dir().join(format!("{archive_name}.zip"))
    }

    pub fn reports_dir(&self, flavor: Flavor) -> PathBuf {
        self.root.join("reports").join(format!("{REPORT_BASENAME}-{flavor}"))
    }

    pub fn report_path(&self, flavor: Flavor, extension: &str) -> PathBuf {
        self.reports_dir(flavor).join(format!("{REPORT_BASENAME}.{extension}"))
    }
}

/// Returns a hidden sibling path used to build `path` before it is renamed into place.
pub fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
