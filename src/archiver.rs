//! Packaging of staging trees into zip archives.

use crate::error::{Error, Result};
use crate::layout::temporary_sibling;
use crate::patterns::{to_slash, walk_files, FileFilter};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

#[cfg(unix)]
fn unix_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}

fn archive_error(archive: &Path, reason: impl ToString) -> Error {
    Error::ArchiveError { archive: archive.display().to_string(), reason: reason.to_string() }
}

fn write_archive(
    staging_dir: &Path,
    root_name: &str,
    files: &[PathBuf],
    target: &Path,
) -> Result<()> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    writer
        .add_directory(format!("{root_name}/"), options.unix_permissions(0o755))
        .map_err(|e| archive_error(target, e))?;

    let mut directories = std::collections::BTreeSet::new();
    for relative in files {
        let mut parent = relative.parent();
        let mut missing = Vec::new();
        while let Some(dir) = parent.filter(|p| !p.as_os_str().is_empty()) {
            if directories.insert(dir.to_path_buf()) {
                missing.push(dir.to_path_buf());
            }
            parent = dir.parent();
        }
        for dir in missing.iter().rev() {
            writer
                .add_directory(
                    format!("{root_name}/{}/", to_slash(dir)),
                    options.unix_permissions(0o755),
                )
                .map_err(|e| archive_error(target, e))?;
        }

        let source = staging_dir.join(relative);
        let name = format!("{root_name}/{}", to_slash(relative));
        debug!("Adding {name}");
        writer
            .start_file(name, options.unix_permissions(unix_mode(&source)?))
            .map_err(|e| archive_error(target, e))?;
        writer.write_all(&fs::read(&source)?)?;
    }

    let mut inner = writer.finish().map_err(|e| archive_error(target, e))?;
    inner.flush()?;
    Ok(())
}

/// Zips `staging_dir` into `target` under a single root folder `root_name`.
///
/// Hidden data directories named `data_dir` are left out. Entries are sorted
/// and carry a fixed timestamp, so identical trees produce identical archives.
///
/// # Errors
/// * `Error::ArchiveError` if the staging tree is missing or any write fails;
///   no partial archive is left at `target`
pub fn create_archive(
    staging_dir: &Path,
    root_name: &str,
    target: &Path,
    data_dir: &str,
) -> Result<PathBuf> {
    if !staging_dir.is_dir() {
        return Err(archive_error(
            target,
            format!("staging directory '{}' does not exist", staging_dir.display()),
        ));
    }
    let files = walk_files(staging_dir, &FileFilter::excluding::<&str>(&[])?, data_dir)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = temporary_sibling(target);
    match write_archive(staging_dir, root_name, &files, &partial) {
        Ok(()) => {
            fs::rename(&partial, target)?;
            info!("Packaged {} file(s) into {}", files.len(), target.display());
            Ok(target.to_path_buf())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(match e {
                Error::IoError(io) => archive_error(target, io),
                other => other,
            })
        }
    }
}

/// Lists the file entries of an archive, in archive order.
pub fn list_archive(archive: &Path) -> Result<Vec<String>> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(|e| archive_error(archive, e))?;
    let mut names = Vec::new();
    for index in 0..zip.len() {
        let entry = zip.by_index(index).map_err(|e| archive_error(archive, e))?;
        if entry.is_file() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Reads one entry of an archive into memory.
pub fn read_entry(archive: &Path, name: &str) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(|e| archive_error(archive, e))?;
    let mut entry = zip.by_name(name).map_err(|e| archive_error(archive, e))?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    Ok(content)
}
