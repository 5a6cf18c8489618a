use crate::constants::{CONVENTIONAL_ENVIRONMENTS, RESERVED_DIRECTORIES, SEQUENCE_MANIFEST};
use crate::error::MigrationError;
use anyhow::Result;
use itertools::Itertools;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Recursively collect files with the given extension under `dir`, in no
/// particular order. Missing directories yield an empty list so optional
/// phases stay optional.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    collect_recursive(dir, extension, &mut files)?;
    Ok(files)
}

fn collect_recursive(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_recursive(&path, extension, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Remove files excluded by environment tagging.
///
/// A path component `_<tag>` that is not a reserved structural name marks an
/// environment directory; a filename stem ending `_<tag>` marks an
/// environment file when `<tag>` is a recognized environment token. Tagged
/// paths survive only when every tag equals `environment_code`
/// (case-insensitive); untagged paths always survive. Passing no code while
/// environment-aware paths exist is a structural error.
pub fn filter_files(
    base: &Path,
    environment_code: Option<&str>,
    files: Vec<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let directory_tags = environment_directory_tags(base)?;

    let code = environment_code
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase);

    let mut known_tokens: HashSet<String> = directory_tags.clone();
    known_tokens.extend(CONVENTIONAL_ENVIRONMENTS.iter().map(|t| t.to_string()));
    if let Some(code) = &code {
        known_tokens.insert(code.clone());
    }

    let tagged: Vec<(PathBuf, Vec<String>)> = files
        .into_iter()
        .map(|file| {
            let tags = environment_tags(base, &file, &known_tokens);
            (file, tags)
        })
        .collect();

    let environment_aware =
        !directory_tags.is_empty() || tagged.iter().any(|(_, tags)| !tags.is_empty());

    let Some(code) = code else {
        if environment_aware {
            return Err(MigrationError::Structure(format!(
                "environment aware directories found under '{}' but no environment code passed",
                base.display()
            ))
            .into());
        }
        return Ok(tagged.into_iter().map(|(file, _)| file).collect());
    };

    Ok(tagged
        .into_iter()
        .filter(|(_, tags)| tags.iter().all(|tag| *tag == code))
        .map(|(file, _)| file)
        .collect())
}

/// Order files the way they will execute: alphabetical by relative path, with
/// any `_sequence.ini` manifest pulling its listed files to the front of its
/// own directory. Subdirectories may carry their own manifest.
pub fn sort_files(base: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut ordered = Vec::with_capacity(files.len());
    order_directory(base, files, &mut ordered)?;
    Ok(ordered)
}

fn order_directory(dir: &Path, files: &[PathBuf], ordered: &mut Vec<PathBuf>) -> Result<()> {
    let mut local_files: BTreeSet<String> = BTreeSet::new();
    let mut subdirectories: BTreeSet<String> = BTreeSet::new();

    for file in files {
        let Ok(relative) = file.strip_prefix(dir) else {
            continue;
        };
        let mut components = relative.components();
        let Some(first) = components.next() else {
            continue;
        };
        let name = first.as_os_str().to_string_lossy().to_string();
        if components.next().is_some() {
            subdirectories.insert(name);
        } else {
            local_files.insert(name);
        }
    }

    let mut sequenced = Vec::new();
    let manifest = dir.join(SEQUENCE_MANIFEST);
    if manifest.is_file() {
        for line in std::fs::read_to_string(&manifest)?.lines() {
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            // Manifest entries with no matching file on disk are skipped
            if local_files.remove(entry) {
                sequenced.push(entry.to_string());
            }
        }
    }

    for name in sequenced {
        ordered.push(dir.join(name));
    }

    // Remaining files and subdirectories share one alphabetical sequence,
    // which matches plain full-relative-path ordering when no manifest exists
    let entries = local_files
        .into_iter()
        .map(|name| (name, false))
        .chain(subdirectories.into_iter().map(|name| (name, true)))
        .sorted();

    for (name, is_dir) in entries {
        if is_dir {
            order_directory(&dir.join(name), files, ordered)?;
        } else {
            ordered.push(dir.join(name));
        }
    }

    Ok(())
}

/// Filter then sort: the file list a phase directory will actually execute.
pub fn collect_scripts(base: &Path, environment_code: Option<&str>) -> Result<Vec<PathBuf>> {
    let files = list_files_with_extension(base, "sql")?;
    let files = filter_files(base, environment_code, files)?;
    sort_files(base, &files)
}

/// Environment tags of every `_<tag>` directory under `base`, lowercased.
fn environment_directory_tags(base: &Path) -> Result<HashSet<String>> {
    let mut tags = HashSet::new();
    if base.is_dir() {
        walk_directory_tags(base, &mut tags)?;
    }
    Ok(tags)
}

fn walk_directory_tags(dir: &Path, tags: &mut HashSet<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && let Some(tag) = name.strip_prefix('_')
            && !RESERVED_DIRECTORIES.contains(name)
        {
            tags.insert(tag.to_lowercase());
        }
        walk_directory_tags(&path, tags)?;
    }
    Ok(())
}

/// Environment tags carried by one file path: directory components plus a
/// recognized filename suffix token.
fn environment_tags(base: &Path, file: &Path, known_tokens: &HashSet<String>) -> Vec<String> {
    let mut tags = Vec::new();
    let relative = file.strip_prefix(base).unwrap_or(file);

    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            let name = component.as_os_str().to_string_lossy();
            if let Some(tag) = name.strip_prefix('_')
                && !RESERVED_DIRECTORIES.contains(name.as_ref())
            {
                tags.push(tag.to_lowercase());
            }
        }
    }

    if let Some(stem) = file.file_stem().and_then(|s| s.to_str())
        && let Some((_, token)) = stem.rsplit_once('_')
    {
        let token = token.to_lowercase();
        if !token.is_empty() && known_tokens.contains(&token) {
            tags.push(token);
        }
    }

    tags
}
