pub mod directory;

use crate::constants::{
    DRAFT_DIRECTORY, ERASE_DIRECTORY, INIT_DIRECTORY, POST_DIRECTORY, PRE_DIRECTORY,
    TRANSACTION_DIRECTORY,
};
use crate::error::MigrationError;
use crate::version::LocalVersion;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A version directory found in the workspace root. Enumerated fresh on every
/// run; never cached across invocations.
#[derive(Debug, Clone)]
pub struct VersionDirectory {
    pub version: LocalVersion,
    pub path: PathBuf,
    /// The directory carries a `_transaction` marker subdirectory demanding an
    /// explicit per-version transaction.
    pub has_explicit_transaction: bool,
}

impl VersionDirectory {
    /// With a `_transaction` marker present, every script must live under the
    /// marker; loose scripts beside it defeat the explicit scope.
    pub fn validate_transaction_layout(&self) -> Result<()> {
        if !self.has_explicit_transaction {
            return Ok(());
        }
        let marker = self.path.join(TRANSACTION_DIRECTORY);
        let all = directory::list_files_with_extension(&self.path, "sql")?;
        let outside: Vec<_> = all
            .iter()
            .filter(|file| !file.starts_with(&marker))
            .collect();
        if outside.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Structure(format!(
                "version directory '{}' has a {} subdirectory, so all scripts must be placed inside it; found {} script(s) outside",
                self.path.display(),
                TRANSACTION_DIRECTORY,
                outside.len()
            ))
            .into())
        }
    }
}

/// The script workspace on disk: reserved phase directories plus version
/// directories named per the version grammar.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn phase_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Check the required layout, raising a single structural error that
    /// enumerates every required path as Found/Missing. Runs before any
    /// database contact.
    pub fn validate(&self) -> Result<()> {
        let mut lines = Vec::new();
        let mut missing = false;

        let mut check = |label: String, found: bool| {
            lines.push(format!(
                "  {} {}",
                if found { "Found  " } else { "Missing" },
                label
            ));
            missing |= !found;
        };

        check(
            self.phase_path(INIT_DIRECTORY).display().to_string(),
            self.phase_path(INIT_DIRECTORY).is_dir(),
        );
        check(
            self.phase_path(PRE_DIRECTORY).display().to_string(),
            self.phase_path(PRE_DIRECTORY).is_dir(),
        );
        let has_version = !self.version_directories()?.is_empty();
        check(
            format!(
                "{} (at least one version directory, e.g. v0.00)",
                self.root.display()
            ),
            has_version,
        );
        check(
            self.phase_path(DRAFT_DIRECTORY).display().to_string(),
            self.phase_path(DRAFT_DIRECTORY).is_dir(),
        );
        check(
            self.phase_path(POST_DIRECTORY).display().to_string(),
            self.phase_path(POST_DIRECTORY).is_dir(),
        );
        check(
            self.phase_path(ERASE_DIRECTORY).display().to_string(),
            self.phase_path(ERASE_DIRECTORY).is_dir(),
        );

        if missing {
            return Err(MigrationError::Structure(format!(
                "the workspace structure at '{}' is invalid:\n{}",
                self.root.display(),
                lines.join("\n")
            ))
            .into());
        }
        Ok(())
    }

    /// Enumerate version directories in ascending order. Directories sharing a
    /// `(major, minor)` key keep their traversal order via stable sort.
    /// Directories that look like versions but fail the grammar are an error;
    /// unrelated directories are ignored.
    pub fn version_directories(&self) -> Result<Vec<VersionDirectory>> {
        let mut directories = Vec::new();
        if !self.root.is_dir() {
            return Ok(directories);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        entries.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('v') && name[1..].starts_with(|c: char| c.is_ascii_digit()) {
                let version = LocalVersion::parse(name)?;
                let has_explicit_transaction = path.join(TRANSACTION_DIRECTORY).is_dir();
                directories.push(VersionDirectory {
                    version,
                    path,
                    has_explicit_transaction,
                });
            } else if !name.starts_with('_') {
                warn!("ignoring non-version directory '{}'", path.display());
            }
        }

        directories.sort_by_key(|dir| dir.version.sequence_key());
        Ok(directories)
    }

    /// Highest version present on disk, used when no target version is given.
    pub fn latest_version(&self) -> Result<Option<LocalVersion>> {
        Ok(self
            .version_directories()?
            .into_iter()
            .next_back()
            .map(|dir| dir.version))
    }
}
