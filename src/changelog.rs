//! Release notes built from the local git history.

use crate::error::{Error, Result};
use git2::{Oid, Repository, Sort};
use log::{debug, warn};
use std::collections::HashSet;
use std::path::Path;

/// Upper bound on listed commits when no earlier tag exists.
const MAX_COMMITS: usize = 200;

fn git_error(e: git2::Error) -> Error {
    Error::PublishError(format!("cannot read git history: {}", e.message()))
}

/// Lists commits from `HEAD` back to the most recent tag other than
/// `release_tag`, one `- <short id> <summary>` line per commit.
pub fn changelog(repo: &Repository, release_tag: &str) -> Result<String> {
    let mut tagged: HashSet<Oid> = HashSet::new();
    let names = repo.tag_names(None).map_err(git_error)?;
    for name in names.iter().flatten().filter(|name| *name != release_tag) {
        let commit = repo
            .revparse_single(&format!("refs/tags/{name}"))
            .and_then(|object| object.peel_to_commit());
        if let Ok(commit) = commit {
            tagged.insert(commit.id());
        }
    }

    let mut walk = repo.revwalk().map_err(git_error)?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME).map_err(git_error)?;
    walk.push_head().map_err(git_error)?;

    let mut lines = Vec::new();
    for oid in walk {
        let oid = oid.map_err(git_error)?;
        if tagged.contains(&oid) {
            debug!("Changelog stops at tagged commit {oid}");
            break;
        }
        if lines.len() == MAX_COMMITS {
            break;
        }
        let commit = repo.find_commit(oid).map_err(git_error)?;
        let short = oid.to_string();
        let summary = commit.summary().unwrap_or_default();
        lines.push(format!("- {} {summary}", &short[..7]));
    }
    Ok(lines.join("\n"))
}

/// Builds the changelog for the repository containing `dir`, or an empty
/// one if there is no usable repository.
pub fn changelog_for(dir: &Path, release_tag: &str) -> String {
    match Repository::discover(dir).map_err(git_error).and_then(|repo| changelog(&repo, release_tag)) {
        Ok(text) => text,
        Err(e) => {
            warn!("Publishing without changelog: {e}");
            String::new()
        }
    }
}
